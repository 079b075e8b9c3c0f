//! Per-moment record decoding.
//!
//! A record is selected by the high bit of its first byte:
//! - set: delta record, offsets against the previous moment of the block
//! - clear: absolute record, self-contained position
//!
//! The selector byte is only peeked; each variant then reads its own fields
//! exactly once. Coordinates stay in integer 1e-5 degree units until the
//! whole block is decoded (see `RawMoment::scale`).
//!
//! | field    | delta           | absolute                |
//! |----------|-----------------|-------------------------|
//! | time     | u16 (15 bits)   | u32 offset to base time |
//! | lat, lon | i16 each        | i32 each                |
//! | alt      | i16, raw        | i16                     |
//! | dtf      | i16 delta       | i32                     |
//! | lap      | u8, raw         | u8                      |
//! | pc       | i16 / 32000     | i32 / 21000000          |

use crate::cursor::Cursor;
use crate::header::Flags;
use crate::types::{Moment, Result, YbError, COORD_SCALE};

/// High bit of the first record byte marks a delta record.
const DELTA_SELECTOR: u8 = 0x80;

/// Mask removing the selector bit from the delta time field.
const TIME_DELTA_MASK: u16 = 0x7FFF;

/// Divisor of the progress field in delta records.
const PC_DELTA_DIVISOR: f64 = 32_000.0;

/// Divisor of the progress field in absolute records.
const PC_ABSOLUTE_DIVISOR: f64 = 21_000_000.0;

// ---------------------------------------------------------------------------
// Raw moment
// ---------------------------------------------------------------------------

/// A reconstructed moment with coordinates still in 1e-5 degree units.
///
/// Delta accumulation happens on these integers so it stays exact.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMoment {
    pub lat: i64,
    pub lon: i64,
    pub at: u32,
    pub dtf: Option<i32>,
    pub lap: Option<u8>,
    pub alt: Option<i16>,
    pub pc: Option<f64>,
}

impl RawMoment {
    /// Convert coordinates to floating-point degrees.
    pub fn scale(&self) -> Moment {
        Moment {
            dtf: self.dtf,
            lat: self.lat as f64 / COORD_SCALE,
            lon: self.lon as f64 / COORD_SCALE,
            at: self.at,
            lap: self.lap,
            alt: self.alt,
            pc: self.pc,
        }
    }
}

// ---------------------------------------------------------------------------
// Record variants
// ---------------------------------------------------------------------------

/// Delta-compressed record, relative to the previous moment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    /// Seconds to subtract from the previous moment's time.
    pub time_delta: u16,
    pub lat_delta: i16,
    pub lon_delta: i16,
    pub alt: Option<i16>,
    pub dtf_delta: Option<i16>,
    pub lap: Option<u8>,
    pub pc_delta: Option<f64>,
}

/// Self-contained record.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsoluteRecord {
    /// Seconds after the stream base time.
    pub time_offset: u32,
    pub lat: i32,
    pub lon: i32,
    pub alt: Option<i16>,
    pub dtf: Option<i32>,
    pub lap: Option<u8>,
    pub pc: Option<f64>,
}

/// One encoded moment.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Delta(DeltaRecord),
    Absolute(AbsoluteRecord),
}

/// Where a record sits, for error reporting and time reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext {
    pub vessel_id: u16,
    pub offset: usize,
    pub base_time: u32,
}

impl Record {
    /// Read one record at the cursor using the stream's field layout.
    pub fn read(cursor: &mut Cursor<'_>, flags: &Flags) -> Result<Self> {
        let selector = cursor.peek_u8()?;
        if selector & DELTA_SELECTOR == DELTA_SELECTOR {
            DeltaRecord::read(cursor, flags).map(Record::Delta)
        } else {
            AbsoluteRecord::read(cursor, flags).map(Record::Absolute)
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Record::Delta(_))
    }

    /// Reconstruct the absolute moment this record describes.
    ///
    /// Delta records require `previous`; the first record of a block must be
    /// absolute.
    pub fn resolve(&self, previous: Option<&RawMoment>, ctx: RecordContext) -> Result<RawMoment> {
        match self {
            Record::Delta(delta) => {
                let previous = previous.ok_or(YbError::DeltaWithoutPredecessor {
                    vessel_id: ctx.vessel_id,
                    offset: ctx.offset,
                })?;
                delta.apply(previous, ctx.offset)
            }
            Record::Absolute(abs) => abs.resolve(ctx.base_time, ctx.offset),
        }
    }
}

impl DeltaRecord {
    fn read(cursor: &mut Cursor<'_>, flags: &Flags) -> Result<Self> {
        // The selector bit shares the time field.
        let time_delta = cursor.read_u16()? & TIME_DELTA_MASK;
        let lat_delta = cursor.read_i16()?;
        let lon_delta = cursor.read_i16()?;

        let alt = if flags.altitude {
            Some(cursor.read_i16()?)
        } else {
            None
        };

        let (dtf_delta, lap) = if flags.distance_to_finish {
            let dtf = cursor.read_i16()?;
            let lap = if flags.lap {
                Some(cursor.read_u8()?)
            } else {
                None
            };
            (Some(dtf), lap)
        } else {
            (None, None)
        };

        let pc_delta = if flags.progress {
            Some(cursor.read_i16()? as f64 / PC_DELTA_DIVISOR)
        } else {
            None
        };

        Ok(DeltaRecord {
            time_delta,
            lat_delta,
            lon_delta,
            alt,
            dtf_delta,
            lap,
            pc_delta,
        })
    }

    /// Offset the previous moment by this record.
    ///
    /// Altitude and lap are taken as-is, not accumulated.
    fn apply(&self, previous: &RawMoment, offset: usize) -> Result<RawMoment> {
        let at = previous
            .at
            .checked_sub(self.time_delta as u32)
            .ok_or(YbError::Overflow { field: "at", offset })?;

        let dtf = match self.dtf_delta {
            Some(delta) => Some(
                previous
                    .dtf
                    .unwrap_or_default()
                    .checked_add(delta as i32)
                    .ok_or(YbError::Overflow { field: "dtf", offset })?,
            ),
            None => None,
        };

        let pc = match self.pc_delta {
            Some(delta) => Some(previous.pc.unwrap_or_default() + delta),
            None => previous.pc,
        };

        Ok(RawMoment {
            lat: previous.lat + self.lat_delta as i64,
            lon: previous.lon + self.lon_delta as i64,
            at,
            dtf,
            lap: self.lap,
            alt: self.alt,
            pc,
        })
    }
}

impl AbsoluteRecord {
    fn read(cursor: &mut Cursor<'_>, flags: &Flags) -> Result<Self> {
        let time_offset = cursor.read_u32()?;
        let lat = cursor.read_i32()?;
        let lon = cursor.read_i32()?;

        let alt = if flags.altitude {
            Some(cursor.read_i16()?)
        } else {
            None
        };

        let (dtf, lap) = if flags.distance_to_finish {
            let dtf = cursor.read_i32()?;
            let lap = if flags.lap {
                Some(cursor.read_u8()?)
            } else {
                None
            };
            (Some(dtf), lap)
        } else {
            (None, None)
        };

        let pc = if flags.progress {
            Some(cursor.read_i32()? as f64 / PC_ABSOLUTE_DIVISOR)
        } else {
            None
        };

        Ok(AbsoluteRecord {
            time_offset,
            lat,
            lon,
            alt,
            dtf,
            lap,
            pc,
        })
    }

    fn resolve(&self, base_time: u32, offset: usize) -> Result<RawMoment> {
        let at = base_time
            .checked_add(self.time_offset)
            .ok_or(YbError::Overflow { field: "at", offset })?;

        Ok(RawMoment {
            lat: self.lat as i64,
            lon: self.lon as i64,
            at,
            dtf: self.dtf,
            lap: self.lap,
            alt: self.alt,
            pc: self.pc,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
