//! Byte-at-a-time stream reassembly.
//!
//! A [`CodecSession`] owns one stream's receive buffer, its reassembly
//! cursor and a transmit scratch buffer. Bytes are pushed in as they arrive;
//! complete, validated packets come out. Independent streams use independent
//! sessions.
//!
//! While a candidate frame accumulates, header-valid positions inside its
//! claimed span are tracked as well. Whichever frame validates first is
//! emitted, so a corrupted length field cannot hold back the frames that
//! follow it.

use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{
    decode_frame, encode_packet, parse_header, FrameConfig, Packet, ResyncMode, HEADER_SIZE,
    MAX_FRAME_SIZE,
};
use crate::error::Result;
use crate::types::DataType;

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No header located yet.
    Seeking,
    /// A valid header was found; waiting for the rest of the frame.
    Accumulating,
}

/// Snapshot of the reassembly cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Next write position in the receive buffer.
    pub write_pos: usize,
    /// Start of the current candidate frame.
    pub frame_start: usize,
    /// Total length of the candidate frame; 0 while seeking.
    pub expected_len: usize,
}

/// Counters kept across the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub bytes_in: u64,
    pub packets: u64,
    /// Candidates whose header checked out but whose frame did not, or that
    /// were abandoned for a frame nested in their claimed span.
    pub rejected: u64,
}

// Header-valid position inside the current candidate's span.
#[derive(Debug, Clone, Copy)]
struct Nested {
    start: usize,
    end: usize,
}

/// Stream reassembler and encoder for a single byte stream.
#[derive(Debug)]
pub struct CodecSession {
    rx: Box<[u8]>,
    cursor: Cursor,
    nested: Vec<Nested>,
    nested_scan: usize,
    ready: VecDeque<Packet>,
    tx: BytesMut,
    resync: ResyncMode,
    stats: SessionStats,
}

impl CodecSession {
    /// Create a session with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a session with explicit configuration.
    ///
    /// Capacity is raised to at least one maximal frame.
    pub fn with_config(config: &FrameConfig) -> Self {
        let capacity = config.session_capacity.max(MAX_FRAME_SIZE);
        Self {
            rx: vec![0u8; capacity].into_boxed_slice(),
            cursor: Cursor::default(),
            nested: Vec::new(),
            nested_scan: 0,
            ready: VecDeque::new(),
            tx: BytesMut::with_capacity(MAX_FRAME_SIZE),
            resync: config.resync,
            stats: SessionStats::default(),
        }
    }

    /// Receive buffer size.
    pub fn capacity(&self) -> usize {
        self.rx.len()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn resync_mode(&self) -> ResyncMode {
        self.resync
    }

    pub fn state(&self) -> SessionState {
        if self.cursor.expected_len == 0 {
            SessionState::Seeking
        } else {
            SessionState::Accumulating
        }
    }

    /// Bytes held in the receive buffer that are not yet part of an emitted
    /// packet.
    pub fn buffered(&self) -> usize {
        self.cursor.write_pos - self.cursor.frame_start
    }

    /// Encode a packet into the session's transmit buffer and return the frame.
    ///
    /// The returned slice is valid until the next call to `encode`.
    pub fn encode(
        &mut self,
        param: Option<[u8; 2]>,
        data_type: DataType,
        element_count: usize,
        payload: Option<&[u8]>,
    ) -> Result<&[u8]> {
        self.tx.clear();
        encode_packet(param, data_type, element_count, payload, &mut self.tx)?;
        Ok(&self.tx[..])
    }

    /// Ingest one byte. Returns a packet if this byte completed one.
    ///
    /// Packets completed in the same call beyond the first are queued and
    /// handed out by [`CodecSession::next_packet`].
    pub fn push_byte(&mut self, byte: u8) -> Option<Packet> {
        if self.cursor.write_pos == self.rx.len() {
            self.make_room();
        }

        self.rx[self.cursor.write_pos] = byte;
        self.cursor.write_pos += 1;
        self.stats.bytes_in += 1;

        self.advance();
        self.ready.pop_front()
    }

    /// Ingest a chunk, returning every packet it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Packet> {
        let mut packets = Vec::new();
        for &byte in bytes {
            if let Some(packet) = self.push_byte(byte) {
                packets.push(packet);
            }
        }
        packets.extend(self.ready.drain(..));
        packets
    }

    /// Pop a packet queued by an earlier [`CodecSession::push_byte`].
    pub fn next_packet(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    /// Drop all buffered bytes and queued packets and restart seeking.
    pub fn flush(&mut self) {
        self.cursor = Cursor::default();
        self.nested.clear();
        self.ready.clear();
    }

    fn advance(&mut self) {
        loop {
            let Cursor {
                write_pos,
                frame_start,
                expected_len,
            } = self.cursor;
            let available = write_pos - frame_start;

            if expected_len == 0 {
                if available < HEADER_SIZE {
                    break;
                }
                match parse_header(&self.rx[frame_start..write_pos]) {
                    Ok(header) => {
                        trace!(
                            frame_start,
                            payload_bytes = header.payload_bytes,
                            "header located"
                        );
                        self.cursor.expected_len = header.frame_len();
                        self.nested.clear();
                        self.nested_scan = frame_start + 1;
                    }
                    Err(_) => self.cursor.frame_start += 1,
                }
                continue;
            }

            if available < expected_len {
                if self.settle_nested() {
                    continue;
                }
                break;
            }

            let frame_end = frame_start + expected_len;
            match decode_frame(&self.rx[frame_start..frame_end]) {
                Ok(packet) => self.emit(packet, frame_end),
                Err(err) => {
                    debug!(frame_start, error = %err, "rejecting candidate frame");
                    self.stats.rejected += 1;
                    self.seek_from(frame_start + 1);
                }
            }
        }

        if self.cursor.frame_start == self.cursor.write_pos {
            self.cursor.frame_start = 0;
            self.cursor.write_pos = 0;
        }
    }

    /// Look for frames nested in the current candidate's span that complete
    /// before it does. Returns true if one was emitted.
    fn settle_nested(&mut self) -> bool {
        let Cursor {
            write_pos,
            frame_start,
            expected_len,
        } = self.cursor;
        let frame_end = frame_start + expected_len;

        while self.nested_scan + HEADER_SIZE <= write_pos {
            let start = self.nested_scan;
            self.nested_scan += 1;
            if let Ok(header) = parse_header(&self.rx[start..write_pos]) {
                let end = start + header.frame_len();
                if end < frame_end {
                    self.nested.push(Nested { start, end });
                }
            }
        }

        loop {
            let complete = self
                .nested
                .iter()
                .enumerate()
                .filter(|(_, nested)| nested.end <= write_pos)
                .min_by_key(|(_, nested)| (nested.end, nested.start))
                .map(|(index, _)| index);
            let Some(index) = complete else {
                return false;
            };

            let Nested { start, end } = self.nested.swap_remove(index);
            match decode_frame(&self.rx[start..end]) {
                Ok(packet) => {
                    debug!(
                        frame_start,
                        nested_start = start,
                        "abandoning candidate for nested frame"
                    );
                    self.stats.rejected += 1;
                    self.emit(packet, end);
                    return true;
                }
                Err(err) => trace!(start, error = %err, "nested candidate failed"),
            }
        }
    }

    fn emit(&mut self, packet: Packet, frame_end: usize) {
        trace!(
            data_type = %packet.data_type,
            payload_bytes = packet.payload_bytes(),
            "packet decoded"
        );
        self.stats.packets += 1;
        self.ready.push_back(packet);

        match self.resync {
            ResyncMode::Slide => self.seek_from(frame_end),
            ResyncMode::Reset => {
                let write_pos = self.cursor.write_pos;
                if frame_end < write_pos {
                    debug!(
                        dropped = write_pos - frame_end,
                        "discarding bytes after packet"
                    );
                }
                self.cursor = Cursor::default();
                self.nested.clear();
            }
        }
    }

    fn seek_from(&mut self, frame_start: usize) {
        self.cursor.frame_start = frame_start;
        self.cursor.expected_len = 0;
        self.nested.clear();
    }

    // Called with a full buffer. Capacity holds a maximal frame, so any
    // candidate starting at 0 has already been decided by now.
    fn make_room(&mut self) {
        let Cursor {
            write_pos,
            frame_start,
            ..
        } = self.cursor;
        debug_assert!(frame_start > 0, "full receive buffer with nothing to discard");

        trace!(frame_start, write_pos, "compacting receive buffer");
        self.rx.copy_within(frame_start..write_pos, 0);
        self.cursor.write_pos -= frame_start;
        self.cursor.frame_start = 0;
        self.nested_scan = self.nested_scan.saturating_sub(frame_start);
        for nested in &mut self.nested {
            nested.start -= frame_start;
            nested.end -= frame_start;
        }
    }
}

impl Default for CodecSession {
    fn default() -> Self {
        Self::new()
    }
}
