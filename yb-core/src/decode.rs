//! Decode a YB Tracking position stream into per-vessel moment lists.
//!
//! Stream layout:
//! - 5-byte header (flags, base time)
//! - vessel blocks back-to-back until the end of the buffer, each:
//!   - u16 vessel id, u16 moment count
//!   - `count` records, newest first
//!
//! Each block is decoded independently; the only carried state is the
//! previous moment within the current block.

use tracing::{debug, trace};

use crate::cursor::Cursor;
use crate::header::StreamHeader;
use crate::record::{RawMoment, Record, RecordContext};
use crate::types::*;

/// Size of a vessel block header (id + moment count).
const BLOCK_HEADER_LEN: usize = 4;

/// Decode a complete stream buffer.
///
/// Any malformation aborts the whole decode.
pub fn decode(buf: &[u8]) -> Result<Vec<VesselBlock>> {
    StreamDecoder::new(buf)?.collect()
}

/// Lazy decoder yielding vessel blocks in buffer order.
///
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct StreamDecoder<'a> {
    cursor: Cursor<'a>,
    header: StreamHeader,
    failed: bool,
}

impl<'a> StreamDecoder<'a> {
    /// Parse the stream header; blocks are decoded on iteration.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(buf);
        let header = StreamHeader::read(&mut cursor)?;
        debug!(
            flags = header.flags.bits(),
            base_time = header.base_time,
            len = buf.len(),
            delta_len = header.flags.delta_record_len(),
            absolute_len = header.flags.absolute_record_len(),
            "stream header"
        );
        Ok(StreamDecoder {
            cursor,
            header,
            failed: false,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Byte offset of the next vessel block.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    fn next_block(&mut self) -> Result<VesselBlock> {
        let block_offset = self.cursor.position();
        let remaining = self.cursor.remaining();
        if remaining < BLOCK_HEADER_LEN {
            return Err(YbError::TrailingBytes {
                offset: block_offset,
                remaining,
            });
        }

        let vessel_id = self.cursor.read_u16()?;
        let count = self.cursor.read_u16()?;

        let mut raw: Vec<RawMoment> = Vec::new();
        raw.try_reserve_exact(count as usize)
            .map_err(|_| YbError::Allocation {
                vessel_id,
                moments: count,
            })?;

        let mut previous: Option<RawMoment> = None;
        for _ in 0..count {
            let ctx = RecordContext {
                vessel_id,
                offset: self.cursor.position(),
                base_time: self.header.base_time,
            };
            let record = Record::read(&mut self.cursor, &self.header.flags)?;
            let moment = record.resolve(previous.as_ref(), ctx)?;
            trace!(
                vessel_id,
                offset = ctx.offset,
                delta = record.is_delta(),
                at = moment.at,
                "record"
            );
            raw.push(moment.clone());
            previous = Some(moment);
        }

        debug!(vessel_id, moments = count, offset = block_offset, "vessel block");

        // Scale only after the block is complete so deltas stay exact.
        Ok(VesselBlock {
            id: vessel_id,
            moments: raw.iter().map(RawMoment::scale).collect(),
        })
    }
}

impl Iterator for StreamDecoder<'_> {
    type Item = Result<VesselBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_at_end() {
            return None;
        }
        let block = self.next_block();
        if block.is_err() {
            self.failed = true;
        }
        Some(block)
    }
}

impl std::iter::FusedIterator for StreamDecoder<'_> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_LEN;
    use proptest::prelude::*;

    /// Builds stream buffers record by record.
    struct StreamBuilder {
        buf: Vec<u8>,
    }

    impl StreamBuilder {
        fn new(flags: u8, base_time: u32) -> Self {
            let mut buf = vec![flags];
            buf.extend_from_slice(&base_time.to_be_bytes());
            StreamBuilder { buf }
        }

        fn block(mut self, id: u16, count: u16) -> Self {
            self.buf.extend_from_slice(&id.to_be_bytes());
            self.buf.extend_from_slice(&count.to_be_bytes());
            self
        }

        fn absolute(mut self, t: u32, lat: i32, lon: i32) -> Self {
            self.buf.extend_from_slice(&t.to_be_bytes());
            self.buf.extend_from_slice(&lat.to_be_bytes());
            self.buf.extend_from_slice(&lon.to_be_bytes());
            self
        }

        fn delta(mut self, w: u16, y: i16, m: i16) -> Self {
            self.buf.extend_from_slice(&(w | 0x8000).to_be_bytes());
            self.buf.extend_from_slice(&y.to_be_bytes());
            self.buf.extend_from_slice(&m.to_be_bytes());
            self
        }

        fn i16(mut self, v: i16) -> Self {
            self.buf.extend_from_slice(&v.to_be_bytes());
            self
        }

        fn i32(mut self, v: i32) -> Self {
            self.buf.extend_from_slice(&v.to_be_bytes());
            self
        }

        fn u8(mut self, v: u8) -> Self {
            self.buf.push(v);
            self
        }

        fn build(self) -> Vec<u8> {
            self.buf
        }
    }

    #[test]
    fn test_header_only() {
        let buf = StreamBuilder::new(0x0F, 12345).build();
        assert_eq!(buf.len(), HEADER_LEN);
        assert!(decode(&buf).unwrap().is_empty());
    }

    #[test]
    fn test_short_header_truncated() {
        assert!(matches!(decode(&[]), Err(YbError::Truncated { offset: 0, .. })));
        assert!(matches!(
            decode(&[0x00, 0x00, 0x00, 0x00]),
            Err(YbError::Truncated { .. })
        ));
    }

    #[test]
    fn test_single_absolute_example() {
        let buf = [
            0x00, 0x00, 0x00, 0x00, 0x64, // flags, base time 100
            0x00, 0x01, 0x00, 0x01, // vessel 1, 1 moment
            0x00, 0x00, 0x00, 0x05, // T = 5
            0x00, 0x01, 0xE2, 0x40, // lat 123456
            0xFF, 0xFF, 0xFF, 0xF0, // lon -16
        ];
        let blocks = decode(&buf).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, 1);
        let m = &blocks[0].moments[0];
        assert_eq!(m.at, 105);
        assert_eq!(m.lat, 1.23456);
        assert_eq!(m.lon, -0.00016);
        assert_eq!(m.dtf, None);
    }

    #[test]
    fn test_absolute_times_from_base() {
        let buf = StreamBuilder::new(0x00, 1_000_000)
            .block(3, 3)
            .absolute(30, 0, 0)
            .absolute(20, 0, 0)
            .absolute(10, 0, 0)
            .build();
        let blocks = decode(&buf).unwrap();
        let times: Vec<u32> = blocks[0].moments.iter().map(|m| m.at).collect();
        assert_eq!(times, vec![1_000_030, 1_000_020, 1_000_010]);
    }

    #[test]
    fn test_delta_chain() {
        let buf = StreamBuilder::new(0x00, 100_000)
            .block(9, 3)
            .absolute(500, 4_512_345, -700_000)
            .delta(60, -5, 12)
            .delta(0x7FFF, 1, -1)
            .build();
        let blocks = decode(&buf).unwrap();
        let m = &blocks[0].moments;
        assert_eq!(m[0].at, 100_500);
        assert_eq!(m[1].at, 100_440);
        assert_eq!(m[2].at, 100_440 - 0x7FFF);
        assert_eq!(m[1].lat, (4_512_345 - 5) as f64 / 100_000.0);
        assert_eq!(m[1].lon, (-700_000 + 12) as f64 / 100_000.0);
        assert_eq!(m[2].lat, (4_512_345 - 5 + 1) as f64 / 100_000.0);
        assert_eq!(m[2].lon, (-700_000 + 12 - 1) as f64 / 100_000.0);
    }

    #[test]
    fn test_dtf_and_lap() {
        let buf = StreamBuilder::new(0x06, 0)
            .block(1, 2)
            .absolute(100, 0, 0)
            .i32(250_000)
            .u8(1)
            .delta(10, 0, 0)
            .i16(-300)
            .u8(2)
            .build();
        let m = &decode(&buf).unwrap()[0].moments;
        assert_eq!(m[0].dtf, Some(250_000));
        assert_eq!(m[0].lap, Some(1));
        assert_eq!(m[1].dtf, Some(249_700));
        assert_eq!(m[1].lap, Some(2));
    }

    #[test]
    fn test_altitude_not_accumulated() {
        let buf = StreamBuilder::new(0x01, 0)
            .block(1, 2)
            .absolute(100, 0, 0)
            .i16(50)
            .delta(1, 0, 0)
            .i16(8)
            .build();
        let m = &decode(&buf).unwrap()[0].moments;
        assert_eq!(m[0].alt, Some(50));
        assert_eq!(m[1].alt, Some(8));
    }

    #[test]
    fn test_progress_divisors() {
        let buf = StreamBuilder::new(0x08, 0)
            .block(1, 2)
            .absolute(100, 0, 0)
            .i32(2_100_000)
            .delta(1, 0, 0)
            .i16(-1600)
            .build();
        let m = &decode(&buf).unwrap()[0].moments;
        let first = 2_100_000.0 / 21_000_000.0;
        assert_eq!(m[0].pc, Some(first));
        assert_eq!(m[1].pc, Some(first + -1600.0 / 32_000.0));
    }

    #[test]
    fn test_lap_flag_without_dtf_reads_nothing() {
        // 0x04 alone: layout identical to no flags
        let buf = StreamBuilder::new(0x04, 0)
            .block(1, 2)
            .absolute(5, 1, 1)
            .delta(1, 1, 1)
            .build();
        let m = &decode(&buf).unwrap()[0].moments;
        assert!(m.iter().all(|m| m.dtf.is_none() && m.lap.is_none()));
    }

    #[test]
    fn test_previous_resets_per_block() {
        let buf = StreamBuilder::new(0x00, 0)
            .block(1, 1)
            .absolute(5, 100, 100)
            .block(2, 1)
            .delta(1, 1, 1)
            .build();
        let err = decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            YbError::DeltaWithoutPredecessor {
                vessel_id: 2,
                offset: 25
            }
        ));
    }

    #[test]
    fn test_multiple_blocks_and_empty_block() {
        let buf = StreamBuilder::new(0x00, 0)
            .block(1, 1)
            .absolute(5, 1, 2)
            .block(2, 0)
            .block(3, 1)
            .absolute(6, 3, 4)
            .build();
        let blocks = decode(&buf).unwrap();
        let ids: Vec<u16> = blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(blocks[1].is_empty());
    }

    #[test]
    fn test_base_time_overflow() {
        let buf = StreamBuilder::new(0x00, u32::MAX)
            .block(1, 1)
            .absolute(1, 0, 0)
            .build();
        assert!(matches!(
            decode(&buf),
            Err(YbError::Overflow {
                field: "at",
                offset: 9
            })
        ));
    }

    #[test]
    fn test_truncated_mid_record() {
        let mut buf = StreamBuilder::new(0x00, 0).block(1, 1).build();
        buf.extend_from_slice(&[0x00, 0x00, 0x00]);
        assert!(matches!(
            decode(&buf),
            Err(YbError::Truncated {
                offset: 9,
                needed: 4,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut buf = StreamBuilder::new(0x00, 0)
            .block(1, 1)
            .absolute(5, 1, 2)
            .build();
        buf.extend_from_slice(&[0xAA, 0xBB]);
        assert!(matches!(
            decode(&buf),
            Err(YbError::TrailingBytes {
                offset: 21,
                remaining: 2
            })
        ));
    }

    #[test]
    fn test_iterator_fuses_after_error() {
        let mut buf = StreamBuilder::new(0x00, 0)
            .block(1, 1)
            .absolute(5, 1, 2)
            .build();
        buf.push(0x00);
        let mut dec = StreamDecoder::new(&buf).unwrap();
        assert!(dec.next().unwrap().is_ok());
        assert_eq!(dec.position(), 21);
        assert!(dec.next().unwrap().is_err());
        assert!(dec.next().is_none());
    }

    proptest! {
        #[test]
        fn prop_never_panics(buf in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode(&buf);
        }

        #[test]
        fn prop_deterministic(buf in proptest::collection::vec(any::<u8>(), 0..256)) {
            let a = decode(&buf).map_err(|e| e.to_string());
            let b = decode(&buf).map_err(|e| e.to_string());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_delta_time_backward(
            t in 40_000u32..1_000_000,
            steps in proptest::collection::vec((0u16..0x8000, any::<i16>(), any::<i16>()), 1..20),
        ) {
            let mut b = StreamBuilder::new(0x00, 0).block(1, steps.len() as u16 + 1).absolute(t, 0, 0);
            for &(w, y, m) in &steps {
                b = b.delta(w, y, m);
            }
            let buf = b.build();
            let total: u32 = steps.iter().map(|s| s.0 as u32).sum();
            prop_assume!(total <= t);

            let blocks = decode(&buf).unwrap();
            let moments = &blocks[0].moments;
            let mut lat = 0i64;
            for (i, &(w, y, _)) in steps.iter().enumerate() {
                prop_assert_eq!(moments[i + 1].at, moments[i].at - w as u32);
                lat += y as i64;
                prop_assert_eq!(moments[i + 1].lat, lat as f64 / 100_000.0);
            }
        }
    }
}
