use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::types::DataType;

/// Header: magic (2) + type/length (2) + param (2) + checksum (1) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Header plus terminator; the size of a frame with an empty payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

/// Magic bytes: "KS" (0x4B 0x53).
pub const MAGIC: [u8; 2] = [b'K', b'S'];

/// Frame terminator: `'\r'`.
pub const TERMINATOR: u8 = b'\r';

/// Largest payload the 12-bit length field can describe.
pub const MAX_PAYLOAD: usize = 0x0FFF;

/// Largest possible frame on the wire.
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Two caller-defined bytes, opaque to the codec.
    pub param: [u8; 2],
    /// Element type of the payload.
    pub data_type: DataType,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(param: [u8; 2], data_type: DataType, payload: impl Into<Bytes>) -> Self {
        Self {
            param,
            data_type,
            payload: payload.into(),
        }
    }

    /// A payload-less frame, as used for bare commands.
    pub fn command(data_type: DataType, param1: u8, param2: u8) -> Self {
        Self::new([param1, param2], data_type, Bytes::new())
    }

    pub fn payload_bytes(&self) -> usize {
        self.payload.len()
    }

    /// Number of logical elements in the payload.
    pub fn element_count(&self) -> usize {
        self.data_type.element_count(self.payload.len())
    }

    /// The total wire size of this packet (header + payload + terminator).
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Move the payload out, leaving this packet empty.
    ///
    /// A second call returns an empty buffer.
    pub fn take_payload(&mut self) -> Bytes {
        std::mem::take(&mut self.payload)
    }

    /// Consume the packet and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Append this packet's frame to `dst`. Returns the number of bytes written.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<usize> {
        write_frame(
            self.param,
            self.data_type,
            self.payload.len(),
            Some(self.payload.as_ref()),
            dst,
        )
    }
}

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub data_type: DataType,
    pub payload_bytes: usize,
    pub param: [u8; 2],
}

impl Header {
    /// Total frame length implied by this header.
    pub fn frame_len(&self) -> usize {
        self.payload_bytes + FRAME_OVERHEAD
    }
}

/// Checksum over the type/length and param bytes of a header.
///
/// `header` must hold at least 6 bytes; bytes `[2..6]` are summed mod 256.
pub fn checksum(header: &[u8]) -> u8 {
    header[2..6].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode a packet into the wire format.
///
/// `element_count` is scaled by the element width of `data_type`. A missing
/// `param` is sent as two zero bytes; a missing `payload` reserves zeroed
/// payload bytes.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────────────────────┬──────────┬──────────┬──────────┬──────┐
/// │ Magic (2B) │ Type:4 | Length:12 (2B) │ Param    │ Checksum │ Payload  │ '\r' │
/// │ "KS"       │ big-endian, type high   │ (2B)     │ (1B)     │ (Length) │      │
/// └────────────┴─────────────────────────┴──────────┴──────────┴──────────┴──────┘
/// ```
pub fn encode_packet(
    param: Option<[u8; 2]>,
    data_type: DataType,
    element_count: usize,
    payload: Option<&[u8]>,
    dst: &mut BytesMut,
) -> Result<usize> {
    let payload_bytes = data_type
        .payload_bytes(element_count)
        .ok_or(FrameError::PayloadTooLarge {
            size: usize::MAX,
            max: MAX_PAYLOAD,
        })?;
    write_frame(
        param.unwrap_or_default(),
        data_type,
        payload_bytes,
        payload,
        dst,
    )
}

fn write_frame(
    param: [u8; 2],
    data_type: DataType,
    payload_bytes: usize,
    payload: Option<&[u8]>,
    dst: &mut BytesMut,
) -> Result<usize> {
    if payload_bytes > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload_bytes,
            max: MAX_PAYLOAD,
        });
    }
    if let Some(data) = payload {
        if data.len() != payload_bytes {
            return Err(FrameError::PayloadLength {
                expected: payload_bytes,
                actual: data.len(),
            });
        }
    }

    let header = [
        MAGIC[0],
        MAGIC[1],
        (data_type.tag() << 4) | (payload_bytes >> 8) as u8,
        payload_bytes as u8,
        param[0],
        param[1],
    ];

    dst.reserve(payload_bytes + FRAME_OVERHEAD);
    dst.put_slice(&header);
    dst.put_u8(checksum(&header));
    match payload {
        Some(data) => dst.put_slice(data),
        None => dst.put_bytes(0, payload_bytes),
    }
    dst.put_u8(TERMINATOR);

    Ok(payload_bytes + FRAME_OVERHEAD)
}

/// Validate magic and checksum at the start of `src` and decode the header.
pub fn parse_header(src: &[u8]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: src.len(),
        });
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let expected = checksum(src);
    if src[6] != expected {
        return Err(FrameError::ChecksumMismatch {
            expected,
            found: src[6],
        });
    }

    Ok(Header {
        data_type: DataType::from_tag(src[2] >> 4),
        payload_bytes: (usize::from(src[2] & 0x0F) << 8) | usize::from(src[3]),
        param: [src[4], src[5]],
    })
}

/// Check that the byte following a `payload_bytes` payload is the terminator.
pub fn check_terminator(src: &[u8], payload_bytes: usize) -> Result<()> {
    let needed = payload_bytes + FRAME_OVERHEAD;
    if src.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: src.len(),
        });
    }
    match src[needed - 1] {
        TERMINATOR => Ok(()),
        found => Err(FrameError::MissingTerminator { found }),
    }
}

/// Validate and decode one frame starting at `src[0]`.
///
/// Checks run in wire order: minimum length, magic, checksum, payload bounds,
/// terminator. Bytes after the frame are ignored.
pub fn decode_frame(src: &[u8]) -> Result<Packet> {
    if src.len() < FRAME_OVERHEAD {
        return Err(FrameError::Truncated {
            needed: FRAME_OVERHEAD,
            available: src.len(),
        });
    }

    let header = parse_header(src)?;
    check_terminator(src, header.payload_bytes)?;

    let payload = Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + header.payload_bytes]);
    Ok(Packet {
        param: header.param,
        data_type: header.data_type,
        payload,
    })
}

/// What the stream reassembler does after emitting a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResyncMode {
    /// Continue scanning right after the emitted frame.
    #[default]
    Slide,
    /// Clear the whole receive buffer, dropping any bytes that followed
    /// the emitted frame.
    Reset,
}

/// Default reassembly buffer: one maximal frame plus 1 KiB of slack.
pub const DEFAULT_SESSION_CAPACITY: usize = 4096 + 1024 + 32;

/// Default buffered-unpacker capacity: 64 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Byte-at-a-time reassembly buffer size. Clamped to at least
    /// [`MAX_FRAME_SIZE`].
    pub session_capacity: usize,
    /// Buffered unpacker size. Clamped to at least [`MAX_FRAME_SIZE`].
    pub buffer_capacity: usize,
    /// Behavior after a packet is emitted by the reassembler.
    pub resync: ResyncMode,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            session_capacity: DEFAULT_SESSION_CAPACITY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            resync: ResyncMode::default(),
        }
    }
}
