use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_packet, Packet, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};
use crate::types::DataType;
use crate::value::Element;

/// Writes complete frames to any `Write` byte sink.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Write a complete packet (blocking). Returns the frame size.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<usize> {
        self.buf.clear();
        packet.encode(&mut self.buf)?;
        self.write_buffered()
    }

    /// Encode and send `element_count` elements of `data_type`.
    pub fn send(
        &mut self,
        param: Option<[u8; 2]>,
        data_type: DataType,
        element_count: usize,
        payload: Option<&[u8]>,
    ) -> Result<usize> {
        self.buf.clear();
        encode_packet(param, data_type, element_count, payload, &mut self.buf)?;
        self.write_buffered()
    }

    /// Encode and send typed elements.
    pub fn send_elements<E: Element>(&mut self, param: [u8; 2], elements: &[E]) -> Result<usize> {
        let packet = Packet::from_elements(param, elements)?;
        self.write_packet(&packet)
    }

    /// Send a payload-less command frame.
    pub fn send_command(&mut self, data_type: DataType, param1: u8, param2: u8) -> Result<usize> {
        self.send(Some([param1, param2]), data_type, 0, None)
    }

    fn write_buffered(&mut self) -> Result<usize> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(self.buf.len())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::{decode_frame, FRAME_OVERHEAD};
    use crate::reader::PacketReader;
    use crate::unpack::unpack_buffer;

    fn written(writer: PacketWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_packet() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));

        let n = writer
            .send(Some([1, 2]), DataType::U8, 3, Some(&[0xAA, 0xBB, 0xCC]))
            .unwrap();
        assert_eq!(n, 11);

        let wire = written(writer);
        let packet = decode_frame(&wire).unwrap();
        assert_eq!(packet.param, [1, 2]);
        assert_eq!(packet.payload.as_ref(), &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn write_multiple_packets() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));

        writer
            .write_packet(&Packet::new([1, 0], DataType::R1, "one"))
            .unwrap();
        writer
            .write_packet(&Packet::new([2, 0], DataType::R1, "two"))
            .unwrap();
        writer
            .write_packet(&Packet::new([3, 0], DataType::R1, "three"))
            .unwrap();

        let batch = unpack_buffer(&written(writer));
        let payloads: Vec<&[u8]> = batch.packets.iter().map(|p| p.payload.as_ref()).collect();
        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }

    #[test]
    fn send_elements_encodes_type() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_elements([0, 1], &[1i16, -1, 2]).unwrap();

        let packet = decode_frame(&written(writer)).unwrap();
        assert_eq!(packet.data_type, DataType::I16);
        assert_eq!(packet.elements::<i16>().unwrap(), vec![1, -1, 2]);
    }

    #[test]
    fn send_command_is_header_only() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(
            writer.send_command(DataType::R2, 0xA1, 0).unwrap(),
            FRAME_OVERHEAD
        );

        let packet = decode_frame(&written(writer)).unwrap();
        assert_eq!(packet.data_type, DataType::R2);
        assert_eq!(packet.param, [0xA1, 0]);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn payload_too_large_rejected() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));

        let err = writer.send(None, DataType::U64, 512, None).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = PacketWriter::new(sink);

        writer.send_command(DataType::R0, 0xD0, 0).unwrap();

        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(writer.get_ref().data.len(), FRAME_OVERHEAD);
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _inner = writer.into_inner();
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = PacketWriter::new(writer_impl);
        writer.send(Some([5, 0]), DataType::U8, 5, Some(b"retry")).unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_frame(&inner.data).unwrap().param, [5, 0]);
    }

    #[test]
    fn handles_would_block_write() {
        let writer_impl = WouldBlockOnce {
            blocked: false,
            data: Vec::new(),
        };

        let mut writer = PacketWriter::new(writer_impl);
        writer.send(Some([6, 0]), DataType::U8, 5, Some(b"retry")).unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = PacketWriter::new(ZeroWriter);
        let err = writer.send_command(DataType::R0, 0, 0).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_read_back() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_elements([3, 0], &[2.5f64]).unwrap();

        let mut reader = PacketReader::new(Cursor::new(written(writer)));
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.param, [3, 0]);
        assert_eq!(packet.elements::<f64>().unwrap(), vec![2.5]);
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            // Short writes exercise the offset loop.
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct WouldBlockOnce {
        blocked: bool,
        data: Vec<u8>,
    }

    impl Write for WouldBlockOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.blocked {
                self.blocked = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
