use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Targets that follow `--log-level`. Everything else is held to warnings.
const CODEC_TARGETS: [&str; 2] = ["kserial", "kserial_frame"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    /// Rejected candidates and skipped noise.
    Debug,
    /// Every located header and decoded packet.
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Per-target filter: codec crates at `level`, dependencies no louder than
/// `warn`.
pub fn codec_filter(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_targets(CODEC_TARGETS.map(|target| (target, level)))
        .with_default(level.min(LevelFilter::WARN))
}

/// Install the stderr subscriber. Stdout carries decoded packets only.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(codec_filter(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}
