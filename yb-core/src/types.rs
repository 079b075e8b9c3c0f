//! Shared types, error enum, and decoded record types for yb-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by yb-core.
#[derive(Debug, Error)]
pub enum YbError {
    #[error("truncated input at offset {offset}: need {needed} bytes, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("vessel {vessel_id}: delta record at offset {offset} has no preceding moment")]
    DeltaWithoutPredecessor { vessel_id: u16, offset: usize },
    #[error("{remaining} trailing bytes at offset {offset}, too short for a vessel block")]
    TrailingBytes { offset: usize, remaining: usize },
    #[error("{field} out of range in record at offset {offset}")]
    Overflow { field: &'static str, offset: usize },
    #[error("cannot allocate {moments} moments for vessel {vessel_id}")]
    Allocation { vessel_id: u16, moments: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, YbError>;

/// Units of the fixed-point coordinate encoding (1e-5 degrees).
pub const COORD_SCALE: f64 = 100_000.0;

// ---------------------------------------------------------------------------
// Decoded records
// ---------------------------------------------------------------------------

/// One reconstructed position report of a vessel.
///
/// Optional fields are present exactly when the corresponding stream flag is
/// set; `lap` additionally requires the distance-to-finish flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Moment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtf: Option<i32>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Unix timestamp (seconds).
    pub at: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lap: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<i16>,
    /// Course-progress-like fraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc: Option<f64>,
}

/// All moments reported for one vessel, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselBlock {
    pub id: u16,
    pub moments: Vec<Moment>,
}

impl VesselBlock {
    /// Most recent moment (first in stream order).
    pub fn latest(&self) -> Option<&Moment> {
        self.moments.first()
    }

    /// Oldest moment (last in stream order).
    pub fn earliest(&self) -> Option<&Moment> {
        self.moments.last()
    }

    pub fn len(&self) -> usize {
        self.moments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
