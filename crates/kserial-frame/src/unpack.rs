//! Whole-buffer packet extraction.
//!
//! [`unpack_buffer`] walks a buffer for every valid frame it holds, skipping
//! noise one byte at a time. [`PacketBuffer`] keeps the unconsumed tail
//! between ingestion rounds.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_frame, Packet, FRAME_OVERHEAD, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};

/// Packets recovered from one pass over a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketBatch {
    /// Decoded packets in stream order.
    pub packets: Vec<Packet>,
    /// Offset of the first byte that still has to be kept.
    pub consumed: usize,
}

pub(crate) enum Scan {
    Found { packet: Packet, start: usize },
    Pending { resume: usize },
}

/// Find the first complete frame at or after `offset`.
///
/// A header-valid candidate that runs past the end of `src` does not stop
/// the scan: a later complete frame refutes it. `Pending` is returned when
/// nothing decodes; `resume` is then the earliest such candidate, or the
/// start of the final bytes too short to hold a frame.
pub(crate) fn scan(src: &[u8], mut offset: usize) -> Scan {
    let mut pending: Option<usize> = None;
    while src.len().saturating_sub(offset) >= FRAME_OVERHEAD {
        match decode_frame(&src[offset..]) {
            Ok(packet) => {
                if let Some(candidate) = pending {
                    debug!(candidate, start = offset, "frame refutes incomplete candidate");
                }
                return Scan::Found {
                    packet,
                    start: offset,
                };
            }
            Err(FrameError::Truncated { needed, available }) => {
                trace!(offset, needed, available, "incomplete frame candidate");
                pending.get_or_insert(offset);
                offset += 1;
            }
            Err(_) => offset += 1,
        }
    }
    Scan::Pending {
        resume: pending.unwrap_or(offset),
    }
}

/// Decode every frame in `src`.
///
/// Bytes that cannot start a frame are skipped and count as consumed. A
/// header-valid frame that runs past the end of `src`, and any final
/// bytes too short to hold a frame, are left unconsumed unless a later
/// complete frame is found.
pub fn unpack_buffer(src: &[u8]) -> PacketBatch {
    let mut batch = PacketBatch::default();
    let mut offset = 0usize;

    loop {
        match scan(src, offset) {
            Scan::Found { packet, start } => {
                if start > offset {
                    debug!(skipped = start - offset, "skipped noise before frame");
                }
                offset = start + packet.wire_size();
                batch.packets.push(packet);
            }
            Scan::Pending { resume } => {
                batch.consumed = resume;
                return batch;
            }
        }
    }
}

/// Accumulating receive buffer for chunked input.
///
/// Chunks are appended with [`PacketBuffer::extend`]; [`PacketBuffer::read_packets`]
/// extracts all complete frames and compacts the buffer so only the
/// unconsumed tail remains.
#[derive(Debug)]
pub struct PacketBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl PacketBuffer {
    /// Create a buffer holding up to `capacity` bytes (at least one maximal frame).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MAX_FRAME_SIZE);
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Room left before [`PacketBuffer::extend`] fails.
    pub fn spare_capacity(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// The buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append a chunk. Fails without buffering anything if it does not fit.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.len() > self.spare_capacity() {
            return Err(FrameError::BufferOverflow {
                needed: chunk.len(),
                spare: self.spare_capacity(),
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Extract all complete packets and drop the bytes they used.
    pub fn read_packets(&mut self) -> Vec<Packet> {
        let batch = unpack_buffer(&self.buf);
        self.buf.advance(batch.consumed);
        batch.packets
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new(crate::codec::DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::codec::encode_packet;
    use crate::types::DataType;

    fn frame(param: [u8; 2], ty: DataType, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let count = ty.element_count(payload.len());
        encode_packet(Some(param), ty, count, Some(payload), &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn unpacks_back_to_back_frames() {
        let mut wire = frame([1, 0], DataType::U8, b"one");
        wire.extend(frame([2, 0], DataType::U16, &[1, 0, 2, 0]));
        wire.extend(frame([3, 0], DataType::R2, b""));

        let batch = unpack_buffer(&wire);
        assert_eq!(batch.packets.len(), 3);
        assert_eq!(batch.consumed, wire.len());
        assert_eq!(batch.packets[0].payload.as_ref(), b"one");
        assert_eq!(batch.packets[1].element_count(), 2);
        assert_eq!(batch.packets[2].param, [3, 0]);
    }

    #[test]
    fn resyncs_through_noise() {
        let first = frame([0x10, 0x20], DataType::U8, &[1, 2, 3]);
        let second = frame([0x30, 0x40], DataType::I32, &[0xFF; 8]);

        let mut wire = b"\x00KS\x13garbage".to_vec();
        wire.extend(&first);
        wire.extend(b"KSK\rnoise!!");
        wire.extend(&second);

        let batch = unpack_buffer(&wire);
        assert_eq!(batch.packets.len(), 2);
        assert_eq!(batch.packets[0].param, [0x10, 0x20]);
        assert_eq!(batch.packets[1].param, [0x30, 0x40]);
        assert_eq!(batch.packets[1].element_count(), 2);
        assert_eq!(batch.consumed, wire.len());
    }

    #[test]
    fn keeps_incomplete_trailing_frame() {
        let first = frame([1, 1], DataType::U8, b"abc");
        let second = frame([2, 2], DataType::U8, b"defgh");

        let mut wire = first.clone();
        wire.extend(&second[..second.len() - 3]);

        let batch = unpack_buffer(&wire);
        assert_eq!(batch.packets.len(), 1);
        assert_eq!(batch.consumed, first.len());
    }

    fn false_header(claimed: u16) -> Vec<u8> {
        let mut header = vec![
            b'K',
            b'S',
            (claimed >> 8) as u8,
            claimed as u8,
            0,
            0,
        ];
        header.push(crate::codec::checksum(&header));
        header
    }

    #[test]
    fn incomplete_candidate_does_not_hide_later_frames() {
        let first = frame([0x0A, 0], DataType::U8, b"a");
        let second = frame([0x0B, 0], DataType::U8, b"b");

        let mut wire = b"xx".to_vec();
        wire.extend(&first);
        wire.push(0x11);
        wire.extend(false_header(200));
        wire.extend(b"zz");
        wire.extend(&second);

        let batch = unpack_buffer(&wire);
        let params: Vec<[u8; 2]> = batch.packets.iter().map(|p| p.param).collect();
        assert_eq!(params, vec![[0x0A, 0], [0x0B, 0]]);
        assert_eq!(batch.consumed, wire.len());
    }

    #[test]
    fn unrefuted_candidate_is_kept() {
        let first = frame([1, 1], DataType::U8, b"abc");

        let mut wire = first.clone();
        wire.extend(false_header(200));
        wire.extend(b"0123456789");

        let batch = unpack_buffer(&wire);
        assert_eq!(batch.packets.len(), 1);
        assert_eq!(batch.consumed, first.len());
    }

    #[test]
    fn keeps_short_tail() {
        let mut wire = frame([1, 1], DataType::U8, b"x");
        wire.extend(b"KS\x00");

        let batch = unpack_buffer(&wire);
        assert_eq!(batch.packets.len(), 1);
        assert_eq!(batch.consumed, wire.len() - 3);
    }

    #[test]
    fn noise_only_buffer_is_consumed_except_tail() {
        let wire = vec![0x55u8; 32];
        let batch = unpack_buffer(&wire);
        assert!(batch.packets.is_empty());
        assert_eq!(batch.consumed, 32 - (FRAME_OVERHEAD - 1));
    }

    #[test]
    fn empty_and_tiny_buffers() {
        assert_eq!(unpack_buffer(&[]), PacketBatch::default());
        let batch = unpack_buffer(b"KS\x00\x00");
        assert!(batch.packets.is_empty());
        assert_eq!(batch.consumed, 0);
    }

    #[test]
    fn packet_buffer_compacts_between_reads() {
        let wire = frame([7, 7], DataType::U32, &[1, 0, 0, 0, 2, 0, 0, 0]);
        let (head, tail) = wire.split_at(5);

        let mut buffer = PacketBuffer::default();
        buffer.extend(b"zz").unwrap();
        buffer.extend(head).unwrap();
        assert!(buffer.read_packets().is_empty());
        assert_eq!(buffer.len(), 7);

        buffer.extend(tail).unwrap();
        let packets = buffer.read_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].param, [7, 7]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn packet_buffer_rejects_overflow() {
        let mut buffer = PacketBuffer::new(0);
        assert_eq!(buffer.capacity(), MAX_FRAME_SIZE);

        let mut filler = BytesMut::new();
        filler.put_bytes(0, MAX_FRAME_SIZE - 1);
        buffer.extend(&filler).unwrap();

        let err = buffer.extend(b"ab").unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferOverflow {
                needed: 2,
                spare: 1
            }
        ));
        assert_eq!(buffer.len(), MAX_FRAME_SIZE - 1);

        buffer.clear();
        assert_eq!(buffer.spare_capacity(), MAX_FRAME_SIZE);
    }
}
