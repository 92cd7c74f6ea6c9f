use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use kserial_frame::{DataType, ResyncMode};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod types;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one packet and print the frame.
    Encode(EncodeArgs),
    /// Decode packets from a file or stdin.
    Decode(DecodeArgs),
    /// List the payload data types.
    Types(TypesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Types(_) => types::run(format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Payload data type, by name (u8, i16, f32, r1, ...) or tag (0-15).
    #[arg(long = "type", short = 't', value_name = "TYPE", value_parser = parse_data_type)]
    pub data_type: DataType,
    /// Parameter bytes as P1,P2 (decimal or 0x-prefixed hex).
    #[arg(long, short = 'p', value_name = "P1,P2", default_value = "0,0", value_parser = parse_param)]
    pub param: [u8; 2],
    /// Comma-separated element values.
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        conflicts_with = "hex"
    )]
    pub values: Vec<String>,
    /// Payload as hex bytes (e.g. "AA BB CC").
    #[arg(long, conflicts_with = "values")]
    pub hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input file or device. Reads stdin when omitted or "-".
    pub input: Option<PathBuf>,
    /// Treat input as hex text instead of raw bytes.
    #[arg(long)]
    pub hex: bool,
    /// Feed input one byte at a time through the stream reassembler.
    #[arg(long)]
    pub stream: bool,
    /// Reassembler behavior after each packet (with --stream).
    #[arg(long, value_enum, env = "KSERIAL_RESYNC", default_value = "slide")]
    pub resync: ResyncArg,
    /// Receive buffer capacity in bytes.
    #[arg(long, value_name = "BYTES", env = "KSERIAL_BUFFER_CAPACITY")]
    pub buffer_capacity: Option<usize>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct TypesArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResyncArg {
    Slide,
    Reset,
}

impl From<ResyncArg> for ResyncMode {
    fn from(arg: ResyncArg) -> Self {
        match arg {
            ResyncArg::Slide => ResyncMode::Slide,
            ResyncArg::Reset => ResyncMode::Reset,
        }
    }
}

fn parse_data_type(input: &str) -> Result<DataType, String> {
    if let Ok(tag) = input.trim().parse::<u8>() {
        if usize::from(tag) < kserial_frame::TYPE_COUNT {
            return Ok(DataType::from_tag(tag));
        }
        return Err(format!("type tag out of range: {tag}"));
    }
    DataType::from_name(input).ok_or_else(|| format!("unknown data type: {input}"))
}

fn parse_param(input: &str) -> Result<[u8; 2], String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [p1, p2] => Ok([parse_byte(p1)?, parse_byte(p2)?]),
        [p1] => Ok([parse_byte(p1)?, 0]),
        _ => Err(format!("expected P1,P2: {input}")),
    }
}

fn parse_byte(input: &str) -> Result<u8, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| format!("invalid byte value: {input}"))
}

/// Parse hex text, ignoring whitespace, commas and `0x` prefixes.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let mut digits = String::with_capacity(input.len());
    for token in input.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        digits.push_str(token);
    }

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CliError::new(USAGE, format!("invalid hex digit: {bad:?}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex input has an odd number of digits ({})", digits.len()),
        ));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|err| CliError::new(USAGE, format!("invalid hex byte: {err}")))
        })
        .collect()
}
