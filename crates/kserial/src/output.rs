use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use kserial_frame::{DataType, Packet, Value};
use serde::Serialize;
use serde_json::json;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    data_type: &'a str,
    tag: u8,
    param: [u8; 2],
    payload_size: usize,
    element_count: usize,
    values: Option<Vec<serde_json::Value>>,
    payload_hex: String,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    data_type: &'a str,
    param: [u8; 2],
    frame_size: usize,
    frame_hex: String,
}

#[derive(Serialize)]
struct TypeOutput<'a> {
    tag: u8,
    name: &'a str,
    width: usize,
    kind: &'a str,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                data_type: packet.data_type.name(),
                tag: packet.data_type.tag(),
                param: packet.param,
                payload_size: packet.payload_bytes(),
                element_count: packet.element_count(),
                values: packet
                    .values()
                    .ok()
                    .map(|values| values.iter().map(value_json).collect()),
                payload_hex: hex_string(packet.payload.as_ref(), ""),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PARAM", "SIZE", "VALUES"])
                .add_row(vec![
                    packet.data_type.name().to_string(),
                    hex_string(&packet.param, " "),
                    packet.payload_bytes().to_string(),
                    values_preview(packet, true),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} param={} size={} values={}",
                packet.data_type,
                hex_string(&packet.param, " "),
                packet.payload_bytes(),
                values_preview(packet, false)
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload.as_ref());
        }
    }
}

pub fn print_frame(packet: &Packet, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                data_type: packet.data_type.name(),
                param: packet.param,
                frame_size: wire.len(),
                frame_hex: hex_string(wire, ""),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PARAM", "SIZE", "FRAME"])
                .add_row(vec![
                    packet.data_type.name().to_string(),
                    hex_string(&packet.param, " "),
                    wire.len().to_string(),
                    hex_string(wire, " "),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex_string(wire, " ")),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_types(format: OutputFormat) {
    let rows: Vec<TypeOutput<'_>> = DataType::all()
        .iter()
        .map(|ty| TypeOutput {
            tag: ty.tag(),
            name: ty.name(),
            width: ty.width(),
            kind: type_kind(*ty),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TAG", "NAME", "WIDTH", "KIND"]);
            for row in &rows {
                table.add_row(vec![
                    row.tag.to_string(),
                    row.name.to_string(),
                    row.width.to_string(),
                    row.kind.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!(
                    "{:>2} {:<4} width={} {}",
                    row.tag, row.name, row.width, row.kind
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_string(bytes: &[u8], separator: &str) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(separator)
}

fn type_kind(ty: DataType) -> &'static str {
    if ty.is_raw() {
        "raw"
    } else if ty.is_float() {
        "float"
    } else if ty.is_signed() {
        "signed"
    } else {
        "unsigned"
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match *value {
        Value::U8(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::I8(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::F16(bits) => json!(bits),
        Value::F32(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::Raw(b) => json!(b),
    }
}

fn values_preview(packet: &Packet, compact: bool) -> String {
    match packet.values() {
        Ok(values) => values
            .iter()
            .map(|v| {
                let text = v.to_string();
                if compact {
                    text.trim_start().to_string()
                } else {
                    text
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        Err(_) => format!("<unaligned {} bytes>", packet.payload_bytes()),
    }
}
