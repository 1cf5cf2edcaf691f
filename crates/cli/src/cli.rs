//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::{IngestConfig, IngestMode, TransportKind};
use std::path::PathBuf;

/// Sentinel Ingest - detection record ingestion pipeline
#[derive(Parser, Debug)]
#[command(
    name = "sentinel-ingest",
    author,
    version,
    about = "Deliver detection records to an append-only log",
    long_about = "Reads detection records from a CSV export, enriches them with \n\
                  vehicle and session identity, and delivers each one to the \n\
                  configured broker transport with bounded retries."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "INGEST_VERBOSE")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "INGEST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion pipeline
    Run(RunArgs),

    /// Validate configuration without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),

    /// Parse the source and print the first messages without delivering
    DryRun(DryRunArgs),
}

/// Configuration file plus per-key overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detection CSV to ingest
    #[arg(long, env = "DETECTIONS_CSV")]
    pub csv: Option<PathBuf>,

    /// Ingestion mode
    #[arg(long, value_enum, env = "INGEST_MODE")]
    pub mode: Option<ModeArg>,

    /// Number of delivery workers
    #[arg(long, env = "INGEST_WORKERS")]
    pub workers: Option<usize>,

    /// Retry cap for transient send errors
    #[arg(long, env = "INGEST_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Flush timeout at shutdown, in seconds
    #[arg(long, env = "INGEST_FLUSH_TIMEOUT")]
    pub flush_timeout: Option<u64>,

    /// Destination topic
    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    /// Broker transport
    #[arg(long, value_enum, env = "INGEST_TRANSPORT")]
    pub transport: Option<TransportArg>,

    /// Log file for the file transport
    #[arg(long, env = "INGEST_LOG_PATH")]
    pub log_path: Option<PathBuf>,

    /// Vehicle id stamped on every record
    #[arg(long, env = "VEHICLE_ID")]
    pub vehicle_id: Option<String>,

    /// Session id stamped on every record (generated when unset)
    #[arg(long, env = "SESSION_ID")]
    pub session_id: Option<String>,
}

impl ConfigArgs {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut IngestConfig) {
        if let Some(ref csv) = self.csv {
            config.source.csv_path = Some(csv.clone());
        }
        if let Some(mode) = self.mode {
            config.pipeline.mode = mode.into();
        }
        if let Some(workers) = self.workers {
            config.pipeline.worker_count = workers;
        }
        if let Some(retries) = self.max_retries {
            config.pipeline.max_retries = retries;
        }
        if let Some(secs) = self.flush_timeout {
            config.pipeline.flush_timeout_secs = secs;
        }
        if let Some(ref topic) = self.topic {
            config.broker.topic = topic.clone();
        }
        if let Some(transport) = self.transport {
            config.broker.transport = transport.into();
        }
        if let Some(ref path) = self.log_path {
            config.broker.log_path = Some(path.clone());
        }
        if let Some(ref vehicle) = self.vehicle_id {
            config.source.vehicle_id = vehicle.clone();
        }
        if let Some(ref session) = self.session_id {
            config.source.session_id = Some(session.clone());
        }
    }
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "INGEST_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `dry-run` command
#[derive(Args, Debug)]
pub struct DryRunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Number of messages to print
    #[arg(short = 'n', long, default_value = "5")]
    pub limit: usize,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Batch,
    Streaming,
}

impl From<ModeArg> for IngestMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batch => IngestMode::Batch,
            ModeArg::Streaming => IngestMode::Streaming,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TransportArg {
    Memory,
    File,
}

impl From<TransportArg> for TransportKind {
    fn from(transport: TransportArg) -> Self {
        match transport {
            TransportArg::Memory => TransportKind::Memory,
            TransportArg::File => TransportKind::File,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "sentinel-ingest",
            "run",
            "--csv",
            "detections.csv",
            "--workers",
            "3",
            "--mode",
            "batch",
            "--topic",
            "signs",
            "--transport",
            "file",
            "--log-path",
            "out.jsonl",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let mut config = IngestConfig::default();
        args.config.apply(&mut config);

        assert_eq!(config.pipeline.worker_count, 3);
        assert_eq!(config.pipeline.mode, IngestMode::Batch);
        assert_eq!(config.broker.topic, "signs");
        assert_eq!(config.broker.transport, TransportKind::File);
        assert_eq!(config.source.csv_path, Some(PathBuf::from("detections.csv")));
        assert_eq!(config.broker.log_path, Some(PathBuf::from("out.jsonl")));
        assert_eq!(args.metrics_port, 0);
    }

    #[test]
    fn test_dry_run_limit() {
        let cli = Cli::try_parse_from(["sentinel-ingest", "dry-run", "-n", "2"]).unwrap();
        let Commands::DryRun(args) = cli.command else {
            panic!("expected dry-run command");
        };
        assert_eq!(args.limit, 2);
    }
}
