use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::debug;

use crate::codec::{FrameConfig, Packet};
use crate::error::{FrameError, Result};
use crate::unpack::PacketBuffer;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete packets from any `Read` byte source.
///
/// Bytes are accumulated in a [`PacketBuffer`]; noise between frames is
/// skipped and callers only ever see complete, validated packets.
pub struct PacketReader<T> {
    inner: T,
    buf: PacketBuffer,
    ready: VecDeque<Packet>,
    total: u64,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: &FrameConfig) -> Self {
        Self {
            inner,
            buf: PacketBuffer::new(config.buffer_capacity),
            ready: VecDeque::new(),
            total: 0,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                self.total += 1;
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let want = self.buf.spare_capacity().min(READ_CHUNK_SIZE);
            let read = match self.inner.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    debug!(pending = self.buf.len(), "source closed with partial data");
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend(&chunk[..read])?;
            self.ready.extend(self.buf.read_packets());
        }
    }

    /// Drop buffered bytes and any packets not yet returned.
    pub fn flush(&mut self) {
        self.buf.clear();
        self.ready.clear();
    }

    /// Packets returned by [`PacketReader::read_packet`] so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes buffered but not yet part of a returned packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for PacketReader<T> {
    type Item = Result<Packet>;

    /// Yields packets until the source closes.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
