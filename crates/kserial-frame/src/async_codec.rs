//! `tokio_util::codec` adapter.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{Packet, MAX_FRAME_SIZE};
use crate::error::FrameError;
use crate::unpack::{scan, Scan};

/// Frames a byte stream into [`Packet`]s for `FramedRead`/`FramedWrite`.
///
/// Decoding skips noise the same way [`crate::unpack_buffer`] does.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        match scan(src, 0) {
            Scan::Found { packet, start } => {
                src.advance(start + packet.wire_size());
                Ok(Some(packet))
            }
            Scan::Pending { resume } => {
                src.advance(resume);
                src.reserve(MAX_FRAME_SIZE.saturating_sub(src.len()));
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        if !src.is_empty() {
            debug!(pending = src.len(), "discarding partial frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode(dst).map(|_| ())
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode(dst).map(|_| ())
    }
}
