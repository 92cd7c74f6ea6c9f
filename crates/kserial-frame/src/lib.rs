//! Framing for the KS serial packet protocol.
//!
//! Every packet on the wire is laid out as:
//! - The 2-byte magic `"KS"` for stream synchronization
//! - A type nibble and a 12-bit payload length
//! - Two caller-defined parameter bytes
//! - A one-byte header checksum
//! - The payload, then a `'\r'` terminator
//!
//! [`CodecSession`] reassembles packets from a byte-at-a-time stream,
//! [`PacketBuffer`] and [`unpack_buffer`] handle chunked input, and
//! [`PacketReader`]/[`PacketWriter`] wrap any `Read`/`Write` transport.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod session;
pub mod types;
pub mod unpack;
pub mod value;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::PacketCodec;
pub use codec::{
    check_terminator, checksum, decode_frame, encode_packet, parse_header, FrameConfig, Header,
    Packet, ResyncMode, DEFAULT_BUFFER_CAPACITY, DEFAULT_SESSION_CAPACITY, FRAME_OVERHEAD,
    HEADER_SIZE, MAGIC, MAX_FRAME_SIZE, MAX_PAYLOAD, TERMINATOR,
};
pub use error::{ErrorCategory, FrameError, Result};
pub use reader::PacketReader;
pub use session::{CodecSession, Cursor, SessionState, SessionStats};
pub use types::{width_of, DataType, TYPE_COUNT};
pub use unpack::{unpack_buffer, PacketBatch, PacketBuffer};
pub use value::{Element, Value};
pub use writer::PacketWriter;
