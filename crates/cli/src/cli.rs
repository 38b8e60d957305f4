//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Traffic Guard - temporal tracking and safety-rule engine for roadside cameras
#[derive(Parser, Debug)]
#[command(
    name = "traffic-guard",
    author,
    version,
    about = "Traffic safety event pipeline",
    long_about = "Tracks detections frame by frame, evaluates lane-direction, emergency-vehicle \n\
                  and road-hazard rules, and publishes de-duplicated safety events to the \n\
                  configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRAFFIC_GUARD_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRAFFIC_GUARD_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tracking and rule pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Where detections come from
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Camera index; detections for it are read from stdin as JSON lines
    #[arg(long, env = "TRAFFIC_GUARD_CAMERA")]
    pub camera: Option<u32>,

    /// Replay a recorded detection log (JSON lines)
    #[arg(long, env = "TRAFFIC_GUARD_FILE")]
    pub file: Option<PathBuf>,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TRAFFIC_GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Enable a configured sink by name (repeatable)
    #[arg(long = "enable-sink", value_name = "NAME")]
    pub enable_sinks: Vec<String>,

    /// Disable a configured sink by name (repeatable)
    #[arg(long = "disable-sink", value_name = "NAME")]
    pub disable_sinks: Vec<String>,

    /// Maximum number of frames to process (0 = unlimited)
    #[arg(long, default_value = "0", env = "TRAFFIC_GUARD_MAX_FRAMES")]
    pub max_frames: u64,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TRAFFIC_GUARD_TIMEOUT")]
    pub timeout: u64,

    /// Override detection queue capacity
    #[arg(long, env = "TRAFFIC_GUARD_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "TRAFFIC_GUARD_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "traffic_guard.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show rule thresholds
    #[arg(long)]
    pub rules: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
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
