use std::fmt::Display;
use std::str::FromStr;

use kserial_frame::{DataType, Element, Packet, PacketWriter};
use tracing::debug;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut writer = PacketWriter::new(Vec::new());

    let packet = match &args.hex {
        Some(hex) => {
            let payload = parse_hex(hex)?;
            let count = args.data_type.element_count(payload.len());
            writer
                .send(Some(args.param), args.data_type, count, Some(payload.as_slice()))
                .map_err(|err| frame_error("encode failed", err))?;
            Packet::new(args.param, args.data_type, payload)
        }
        None => {
            let packet = build_packet(args.param, args.data_type, &args.values)?;
            writer
                .write_packet(&packet)
                .map_err(|err| frame_error("encode failed", err))?;
            packet
        }
    };

    let wire = writer.into_inner();
    debug!(
        data_type = %packet.data_type,
        elements = packet.element_count(),
        frame_size = wire.len(),
        "encoded packet"
    );
    print_frame(&packet, &wire, format);
    Ok(SUCCESS)
}

/// Parse textual element values into a packet of `data_type`.
///
/// Raw tags take byte values; `F16` takes the raw half-precision bits.
fn build_packet(param: [u8; 2], data_type: DataType, values: &[String]) -> CliResult<Packet> {
    match data_type {
        DataType::U8 => typed::<u8>(param, values),
        DataType::U16 => typed::<u16>(param, values),
        DataType::U32 => typed::<u32>(param, values),
        DataType::U64 => typed::<u64>(param, values),
        DataType::I8 => typed::<i8>(param, values),
        DataType::I16 => typed::<i16>(param, values),
        DataType::I32 => typed::<i32>(param, values),
        DataType::I64 => typed::<i64>(param, values),
        DataType::F32 => typed::<f32>(param, values),
        DataType::F64 => typed::<f64>(param, values),
        DataType::F16 => Ok(retag(typed::<u16>(param, values)?, data_type)),
        DataType::R0 | DataType::R1 | DataType::R2 | DataType::R3 | DataType::R4 => {
            Ok(retag(typed::<u8>(param, values)?, data_type))
        }
    }
}

fn typed<E>(param: [u8; 2], values: &[String]) -> CliResult<Packet>
where
    E: Element + FromStr,
    E::Err: Display,
{
    let elements = values
        .iter()
        .map(|text| {
            parse_value::<E>(text)
                .map_err(|err| CliError::new(USAGE, format!("invalid value {text:?}: {err}")))
        })
        .collect::<CliResult<Vec<E>>>()?;
    Packet::from_elements(param, &elements).map_err(|err| frame_error("encode failed", err))
}

fn parse_value<E>(text: &str) -> Result<E, String>
where
    E: FromStr,
    E::Err: Display,
{
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        // Range is checked by the target type's parse.
        let raw = u64::from_str_radix(hex, 16).map_err(|err| err.to_string())?;
        return raw.to_string().parse::<E>().map_err(|err| err.to_string());
    }
    text.parse::<E>().map_err(|err| err.to_string())
}

fn retag(packet: Packet, data_type: DataType) -> Packet {
    Packet::new(packet.param, data_type, packet.into_payload())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn builds_typed_payloads() {
        let packet = build_packet([1, 2], DataType::U8, &strings(&["170", "0xBB", "204"])).unwrap();
        assert_eq!(packet.payload.as_ref(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(packet.param, [1, 2]);

        let packet = build_packet([0, 0], DataType::I16, &strings(&["-1", "2"])).unwrap();
        assert_eq!(packet.payload.as_ref(), &[0xFF, 0xFF, 0x02, 0x00]);

        let packet = build_packet([0, 0], DataType::F32, &strings(&["1.5"])).unwrap();
        assert_eq!(packet.elements::<f32>().unwrap(), vec![1.5]);
    }

    #[test]
    fn raw_and_half_types_keep_their_tag() {
        let packet = build_packet([0xA1, 0], DataType::R2, &strings(&["1", "2"])).unwrap();
        assert_eq!(packet.data_type, DataType::R2);
        assert_eq!(packet.payload.as_ref(), &[1, 2]);

        let packet = build_packet([0, 0], DataType::F16, &strings(&["0x3C00"])).unwrap();
        assert_eq!(packet.data_type, DataType::F16);
        assert_eq!(packet.payload.as_ref(), &[0x00, 0x3C]);
    }

    #[test]
    fn empty_values_build_a_command() {
        let packet = build_packet([0xD0, 0], DataType::R0, &[]).unwrap();
        assert!(packet.payload.is_empty());
        assert_eq!(packet.wire_size(), 8);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = build_packet([0, 0], DataType::U8, &strings(&["256"])).unwrap_err();
        assert_eq!(err.code, USAGE);

        let err = build_packet([0, 0], DataType::I8, &strings(&["abc"])).unwrap_err();
        assert!(err.message.contains("invalid value"));
    }

    #[test]
    fn parse_value_hex_literals() {
        assert_eq!(parse_value::<u16>("0xFFFF").unwrap(), 0xFFFF);
        assert!(parse_value::<u8>("0x100").is_err());
        assert_eq!(parse_value::<i32>(" -7 ").unwrap(), -7);
    }
}
