//! Stream header: feature flags byte and base timestamp.
//!
//! Layout (5 bytes):
//! - byte 0: flags (bit 0 altitude, bit 1 distance-to-finish, bit 2 lap,
//!   bit 3 progress; higher bits unused)
//! - bytes 1-4: base time, big-endian u32 epoch seconds

use crate::cursor::Cursor;
use crate::types::Result;

const FLAG_ALTITUDE: u8 = 0x01;
const FLAG_DISTANCE_TO_FINISH: u8 = 0x02;
const FLAG_LAP: u8 = 0x04;
const FLAG_PROGRESS: u8 = 0x08;

/// Size of the stream header in bytes.
pub const HEADER_LEN: usize = 5;

/// Optional per-moment fields carried by every record of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub altitude: bool,
    pub distance_to_finish: bool,
    /// Only honoured together with `distance_to_finish`.
    pub lap: bool,
    pub progress: bool,
}

impl Flags {
    pub fn from_bits(bits: u8) -> Self {
        Flags {
            altitude: bits & FLAG_ALTITUDE == FLAG_ALTITUDE,
            distance_to_finish: bits & FLAG_DISTANCE_TO_FINISH == FLAG_DISTANCE_TO_FINISH,
            lap: bits & FLAG_LAP == FLAG_LAP,
            progress: bits & FLAG_PROGRESS == FLAG_PROGRESS,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.altitude {
            bits |= FLAG_ALTITUDE;
        }
        if self.distance_to_finish {
            bits |= FLAG_DISTANCE_TO_FINISH;
        }
        if self.lap {
            bits |= FLAG_LAP;
        }
        if self.progress {
            bits |= FLAG_PROGRESS;
        }
        bits
    }

    /// Lap numbers are nested inside the distance-to-finish field.
    pub fn reads_lap(&self) -> bool {
        self.distance_to_finish && self.lap
    }

    /// Encoded size of a delta record under these flags.
    pub fn delta_record_len(&self) -> usize {
        6 + self.optional_len(2, 2, 2)
    }

    /// Encoded size of an absolute record under these flags.
    pub fn absolute_record_len(&self) -> usize {
        12 + self.optional_len(2, 4, 4)
    }

    fn optional_len(&self, alt: usize, dtf: usize, pc: usize) -> usize {
        let mut len = 0;
        if self.altitude {
            len += alt;
        }
        if self.distance_to_finish {
            len += dtf;
        }
        if self.reads_lap() {
            len += 1;
        }
        if self.progress {
            len += pc;
        }
        len
    }
}

/// Parsed stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub flags: Flags,
    /// Epoch seconds that absolute record time offsets are relative to.
    pub base_time: u32,
}

impl StreamHeader {
    pub fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        let flags = Flags::from_bits(cursor.read_u8()?);
        let base_time = cursor.read_u32()?;
        Ok(StreamHeader { flags, base_time })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
