use std::{fmt::Display, path::PathBuf, time::Duration};

use clap::Parser;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::models::target_set::{TargetSet, TargetSetError};

/// Decoder flags selecting JSON lines output and every message type.
const DECODER_BASE_ARGS: [&str; 2] = ["-format=json", "-msgtype=all"];

/// Collect AMR meter readings and write them to a .prom file for prometheus.
#[derive(Parser, Debug)]
#[command(name = "meter_consumption_exporter")]
pub struct Cli {
    /// Prometheus file destination for use with node exporter.
    #[arg(long)]
    pub promfile: PathBuf,

    /// Meter ids to search for.
    #[arg(long, num_args = 1.., required = true)]
    pub targets: Vec<String>,

    /// How long to wait before erroring out (seconds).
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Radio server executable.
    #[arg(long, default_value = "rtl_tcp")]
    pub radio_server: String,

    /// Decoder executable.
    #[arg(long, default_value = "rtlamr")]
    pub decoder: String,

    /// Extra argument passed to the decoder. Repeatable.
    #[arg(long = "decoder-arg", allow_hyphen_values = true)]
    pub decoder_args: Vec<String>,

    /// Delay between starting the radio server and the decoder (seconds).
    #[arg(long, default_value_t = 2)]
    pub warmup: u64,

    /// Delay between two checks of the collected readings (milliseconds).
    #[arg(long = "poll-interval", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Most verbose log level printed (off, error, warn, info, debug, trace).
    #[arg(long, default_value_t = LevelFilter::INFO)]
    pub log_level: LevelFilter,
}

/// A program and the arguments it is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for ProcessCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub promfile: PathBuf,
    pub targets: TargetSet,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub warmup: Duration,
    pub radio_server: ProcessCommand,
    pub decoder: ProcessCommand,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid targets. Error: {0}")]
    Targets(#[from] TargetSetError),

    #[error("Timeout must be at least one second.")]
    ZeroTimeout,

    #[error("Poll interval must be at least one millisecond.")]
    ZeroPollInterval,
}

impl TryFrom<Cli> for ExporterConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if cli.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let decoder_args = DECODER_BASE_ARGS
            .iter()
            .map(|arg| arg.to_string())
            .chain(cli.decoder_args);

        Ok(ExporterConfig {
            promfile: cli.promfile,
            targets: TargetSet::new(&cli.targets)?,
            timeout: Duration::from_secs(cli.timeout),
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            warmup: Duration::from_secs(cli.warmup),
            radio_server: ProcessCommand::new(cli.radio_server, Vec::<String>::new()),
            decoder: ProcessCommand::new(cli.decoder, decoder_args),
        })
    }
}
