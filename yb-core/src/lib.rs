//! yb-core: Pure decode + track analytics library for YB Tracking position
//! streams (the `AllPositions3` binary format).
//!
//! No async, no I/O in the decode path — just algorithms. This crate is the
//! shared core used by the `decyb` command-line tool in `yb-cli`.

pub mod config;
pub mod cursor;
pub mod decode;
pub mod header;
pub mod racemath;
pub mod record;
pub mod types;

// Re-export commonly used types at crate root
pub use decode::{decode, StreamDecoder};
pub use header::{Flags, StreamHeader};
pub use racemath::{analyze, TrackAnalysis};
pub use types::*;
