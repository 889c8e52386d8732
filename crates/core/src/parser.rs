//! Stream framing recovery for RTT record capture.
//!
//! RTT delivers the frame stream in arbitrary chunks, possibly with garbage
//! before, between, or after frames (channel startup noise, firmware prints
//! sharing the block). The parser reassembles 12-byte frames from that
//! stream without ever needing a restart.
//!
//! A frame is only accepted when the footer bytes appear at offset `f` AND
//! the header bytes appear at `f - 10`. Either marker alone is weak (a
//! cycles field can legitimately contain `0x2020`); both at the correct
//! separation is a strong check.

use crate::record::{FRAME_FOOTER, FRAME_HEADER, FRAME_LEN, MARKER_LEN, PAYLOAD_LEN};
use tracing::trace;

/// Stateful frame extractor.
///
/// Bytes that do not (yet) form a complete frame are retained between
/// [`feed`](RecordParser::feed) calls; at most `FRAME_LEN - 1` trailing bytes
/// survive a pass that found no frame, so pure-noise input cannot grow the
/// buffer.
#[derive(Debug)]
pub struct RecordParser {
    buf: Vec<u8>,
    header: [u8; MARKER_LEN],
    footer: [u8; MARKER_LEN],
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordParser {
    /// Parser with the firmware's fixed markers.
    pub fn new() -> Self {
        Self::with_markers(FRAME_HEADER, FRAME_FOOTER)
    }

    /// Parser with overridden markers, for tests against alternate firmware
    /// builds.
    pub fn with_markers(header: u16, footer: u16) -> Self {
        Self {
            buf: Vec::new(),
            header: header.to_le_bytes(),
            footer: footer.to_le_bytes(),
        }
    }

    /// Number of bytes retained waiting for more input.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append `bytes` and return every complete payload extracted since the
    /// previous call, in stream order.
    ///
    /// Framing only; field decoding is [`crate::record::Record::decode`].
    /// The parser cannot fail: unframeable input is skipped and partial
    /// frames wait for more bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<[u8; PAYLOAD_LEN]> {
        self.buf.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        loop {
            match self.find_frame() {
                Some(footer_at) => {
                    let payload_start = footer_at - PAYLOAD_LEN;
                    let mut payload = [0u8; PAYLOAD_LEN];
                    payload.copy_from_slice(&self.buf[payload_start..footer_at]);
                    payloads.push(payload);

                    let skipped = footer_at - (FRAME_LEN - MARKER_LEN);
                    if skipped > 0 {
                        trace!(skipped, "skipped unframeable bytes before frame");
                    }
                    self.buf.drain(..footer_at + MARKER_LEN);
                }
                None => {
                    // Nothing in the buffer frames. Only the trailing
                    // FRAME_LEN - 1 bytes can still be the prefix of an
                    // incomplete frame (a 12-byte run would have matched),
                    // so everything before them is dead.
                    if self.buf.len() >= FRAME_LEN {
                        let dead = self.buf.len() - (FRAME_LEN - 1);
                        trace!(dropped = dead, "trimmed unframeable bytes");
                        self.buf.drain(..dead);
                    }
                    break;
                }
            }
        }

        payloads
    }

    /// Find the first offset `f` where the footer sits at `f` with the header
    /// at `f - 10`. Returns the footer offset.
    fn find_frame(&self) -> Option<usize> {
        if self.buf.len() < FRAME_LEN {
            return None;
        }
        let earliest_footer = FRAME_LEN - MARKER_LEN;
        (earliest_footer..=self.buf.len() - MARKER_LEN).find(|&f| {
            self.buf[f..f + MARKER_LEN] == self.footer
                && self.buf[f - (FRAME_LEN - MARKER_LEN)..f - PAYLOAD_LEN] == self.header
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn frame(tag: u16, seq_number: u16, cycles: u32) -> [u8; FRAME_LEN] {
        Record {
            tag,
            seq_number,
            cycles,
        }
        .encode_frame()
    }

    fn decode_all(payloads: &[[u8; PAYLOAD_LEN]]) -> Vec<Record> {
        payloads.iter().map(Record::decode).collect()
    }

    #[test]
    fn single_aligned_frame() {
        let mut parser = RecordParser::new();
        let records = decode_all(&parser.feed(&frame(393, 0, 813_092)));
        assert_eq!(
            records,
            vec![Record {
                tag: 393,
                seq_number: 0,
                cycles: 813_092,
            }]
        );
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn frame_split_across_feeds() {
        let mut parser = RecordParser::new();
        let f = frame(787, 1, 820_000);
        for k in 0..FRAME_LEN {
            let mut parser2 = RecordParser::new();
            let mut out = parser2.feed(&f[..k]);
            out.extend(parser2.feed(&f[k..]));
            assert_eq!(decode_all(&out).len(), 1, "split at {k}");
        }
        // Byte-at-a-time.
        let mut out = Vec::new();
        for b in f {
            out.extend(parser.feed(&[b]));
        }
        assert_eq!(decode_all(&out).len(), 1);
    }

    #[test]
    fn noise_yields_nothing_and_stays_bounded() {
        // Deterministic pseudo-random bytes; no marker coincidence expected.
        let mut state = 0x2545F491u32;
        let noise: Vec<u8> = (0..128)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect();

        let mut parser = RecordParser::new();
        assert!(parser.feed(&noise).is_empty());
        assert!(parser.pending() < FRAME_LEN);
    }

    #[test]
    fn all_footer_bytes_yield_nothing() {
        let mut parser = RecordParser::new();
        assert!(parser.feed(&[0x20; 128]).is_empty());
        assert!(parser.pending() < FRAME_LEN);
    }

    #[test]
    fn all_header_bytes_yield_nothing() {
        let mut parser = RecordParser::new();
        assert!(parser.feed(&[0x10; 128]).is_empty());
        assert!(parser.pending() < FRAME_LEN);
    }

    #[test]
    fn footer_valued_payload_is_not_a_delimiter() {
        // Payload of all 0x20 bytes: the footer value occurs at every payload
        // offset, but only the true frame boundary has the header 10 bytes
        // earlier.
        let f = [
            0x10, 0x10, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
        ];
        let mut input = Vec::new();
        input.extend_from_slice(&f);
        input.extend_from_slice(&f);

        let mut parser = RecordParser::new();
        let records = decode_all(&parser.feed(&input));
        assert_eq!(records.len(), 2);
        for rec in records {
            assert_eq!(rec.tag, 0x2020);
            assert_eq!(rec.seq_number, 0x2020);
            assert_eq!(rec.cycles, 0x20202020);
        }
    }

    #[test]
    fn garbage_between_frames_is_skipped() {
        let mut input = Vec::new();
        input.extend_from_slice(&[0xAB, 0xCD, 0x20, 0x20]); // leading noise with a stray footer
        input.extend_from_slice(&frame(393, 0, 1_000));
        input.extend_from_slice(&[0x10, 0x10, 0xFF]); // stray header fragment
        input.extend_from_slice(&frame(787, 1, 2_000));
        input.extend_from_slice(&[0x00; 5]); // trailing noise

        let mut parser = RecordParser::new();
        let records = decode_all(&parser.feed(&input));
        assert_eq!(
            records
                .iter()
                .map(|r| (r.tag, r.seq_number))
                .collect::<Vec<_>>(),
            vec![(393, 0), (787, 1)]
        );
    }

    #[test]
    fn partial_frame_survives_noise_trim() {
        let mut parser = RecordParser::new();
        let f = frame(393, 7, 900_000);

        // 100 noise bytes followed by the first 11 bytes of a real frame.
        let mut input = vec![0x55u8; 100];
        input.extend_from_slice(&f[..FRAME_LEN - 1]);
        assert!(parser.feed(&input).is_empty());

        // The final byte completes the frame.
        let records = decode_all(&parser.feed(&f[FRAME_LEN - 1..]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seq_number, 7);
    }

    #[test]
    fn marker_override_is_honored() {
        let mut parser = RecordParser::with_markers(0xAAAA, 0xBBBB);
        let mut input = vec![0xAA, 0xAA];
        input.extend_from_slice(&[1, 0, 2, 0, 0, 0, 3, 0]);
        input.extend_from_slice(&[0xBB, 0xBB]);

        let records = decode_all(&parser.feed(&input));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag, 1);
        assert_eq!(records[0].cycles, 2);
        assert_eq!(records[0].seq_number, 3);

        // Default markers do not frame under the override.
        let mut parser = RecordParser::with_markers(0xAAAA, 0xBBBB);
        assert!(parser
            .feed(&frame(393, 0, 813_092))
            .is_empty());
    }
}
