use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;

use kserial_frame::{CodecSession, FrameConfig, FrameError, Packet, PacketReader};
use tracing::{debug, info};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

const READ_CHUNK_SIZE: usize = 4 * 1024;

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = frame_config(&args);
    let source = open_source(args.input.as_deref(), args.hex)?;

    let mut printed = 0usize;
    let mut emit = |packet: Packet| {
        print_packet(&packet, format);
        printed = printed.saturating_add(1);
        args.count.is_some_and(|count| printed >= count)
    };

    if args.stream {
        decode_stream(source, &config, &mut emit)?;
    } else {
        decode_buffered(source, &config, &mut emit)?;
    }

    Ok(SUCCESS)
}

fn frame_config(args: &DecodeArgs) -> FrameConfig {
    let mut config = FrameConfig {
        resync: args.resync.into(),
        ..FrameConfig::default()
    };
    if let Some(capacity) = args.buffer_capacity {
        config.session_capacity = capacity;
        config.buffer_capacity = capacity;
    }
    config
}

fn open_source(input: Option<&Path>, hex: bool) -> CliResult<Box<dyn Read>> {
    let mut reader: Box<dyn Read> = match input {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            Box::new(file)
        }
        _ => Box::new(io::stdin().lock()),
    };

    if !hex {
        return Ok(reader);
    }

    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|err| io_error("failed reading hex input", err))?;
    Ok(Box::new(io::Cursor::new(parse_hex(&text)?)))
}

/// Decode with the chunked unpacker. `emit` returns true to stop early.
fn decode_buffered<R: Read>(
    source: R,
    config: &FrameConfig,
    emit: &mut dyn FnMut(Packet) -> bool,
) -> CliResult<()> {
    let mut reader = PacketReader::with_config(source, config);

    loop {
        match reader.read_packet() {
            Ok(packet) => {
                if emit(packet) {
                    break;
                }
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("decode failed", err)),
        }
    }

    debug!(
        packets = reader.total(),
        pending = reader.buffered(),
        "input exhausted"
    );
    Ok(())
}

/// Decode one byte at a time through a [`CodecSession`].
fn decode_stream<R: Read>(
    mut source: R,
    config: &FrameConfig,
    emit: &mut dyn FnMut(Packet) -> bool,
) -> CliResult<()> {
    let mut session = CodecSession::with_config(config);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    'read: loop {
        let read = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("read failed", err)),
        };

        for &byte in &chunk[..read] {
            if let Some(packet) = session.push_byte(byte) {
                if emit(packet) {
                    break 'read;
                }
            }
            while let Some(packet) = session.next_packet() {
                if emit(packet) {
                    break 'read;
                }
            }
        }
    }

    let stats = session.stats();
    info!(
        bytes = stats.bytes_in,
        packets = stats.packets,
        rejected = stats.rejected,
        pending = session.buffered(),
        "stream decode finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::ResyncArg;
    use kserial_frame::{DataType, PacketWriter, ResyncMode};

    fn wire(packets: &[Packet]) -> Vec<u8> {
        let mut writer = PacketWriter::new(Vec::new());
        for packet in packets {
            writer.write_packet(packet).unwrap();
        }
        writer.into_inner()
    }

    fn collect(
        decode: fn(io::Cursor<Vec<u8>>, &FrameConfig, &mut dyn FnMut(Packet) -> bool) -> CliResult<()>,
        input: Vec<u8>,
        config: &FrameConfig,
        limit: Option<usize>,
    ) -> Vec<Packet> {
        let mut out = Vec::new();
        let mut emit = |packet: Packet| {
            out.push(packet);
            limit.is_some_and(|n| out.len() >= n)
        };
        decode(io::Cursor::new(input), config, &mut emit).unwrap();
        out
    }

    fn sample() -> Vec<Packet> {
        vec![
            Packet::new([1, 2], DataType::U8, vec![0xAA, 0xBB, 0xCC]),
            Packet::command(DataType::R0, 0xD0, 0),
            Packet::from_elements([3, 0], &[1.5f32, -2.0]).unwrap(),
        ]
    }

    #[test]
    fn buffered_and_stream_agree() {
        let packets = sample();
        let mut input = b"\x00noise".to_vec();
        input.extend(wire(&packets));
        input.extend(b"KS");

        let config = FrameConfig::default();
        assert_eq!(
            collect(decode_buffered, input.clone(), &config, None),
            packets
        );
        assert_eq!(collect(decode_stream, input, &config, None), packets);
    }

    #[test]
    fn corrupted_length_does_not_stall_either_path() {
        let packets = sample();
        let mut input = vec![b'K', b'S', 0x01, 0x00, 0x00, 0x00];
        input.push(kserial_frame::checksum(&input));
        input.extend(wire(&packets));

        let config = FrameConfig::default();
        assert_eq!(
            collect(decode_buffered, input.clone(), &config, None),
            packets
        );
        assert_eq!(collect(decode_stream, input, &config, None), packets);
    }

    #[test]
    fn count_stops_early() {
        let config = FrameConfig::default();
        let out = collect(decode_stream, wire(&sample()), &config, Some(2));
        assert_eq!(out.len(), 2);

        let out = collect(decode_buffered, wire(&sample()), &config, Some(1));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn reset_mode_keeps_frames_fed_byte_at_a_time() {
        let config = FrameConfig {
            resync: ResyncMode::Reset,
            ..FrameConfig::default()
        };
        let input = wire(&sample());
        let out = collect(decode_stream, input, &config, None);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn frame_config_from_args() {
        let args = DecodeArgs {
            input: None,
            hex: false,
            stream: true,
            resync: ResyncArg::Reset,
            buffer_capacity: Some(8192),
            count: None,
        };
        let config = frame_config(&args);
        assert_eq!(config.resync, ResyncMode::Reset);
        assert_eq!(config.session_capacity, 8192);
        assert_eq!(config.buffer_capacity, 8192);
    }

    #[test]
    fn hex_file_source() {
        let path = std::env::temp_dir().join(format!("kserial-hex-{}.txt", std::process::id()));
        std::fs::write(&path, "4B 53 00 03 01 02 06 AA BB CC 0D\n").unwrap();

        let source = open_source(Some(path.as_path()), true).unwrap();
        let mut out = Vec::new();
        decode_buffered(source, &FrameConfig::default(), &mut |packet: Packet| {
            out.push(packet);
            false
        })
        .unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].param, [1, 2]);
    }

    #[test]
    fn missing_input_file_is_not_found() {
        let err = match open_source(Some(Path::new("/nonexistent/kserial/input.bin")), false) {
            Ok(_) => panic!("expected open failure"),
            Err(err) => err,
        };
        assert_eq!(err.code, crate::exit::NOT_FOUND);
    }
}
