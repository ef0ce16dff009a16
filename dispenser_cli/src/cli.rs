//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dispenser", version, about = "Two-channel metered liquid dispenser")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dispenser_config.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispensing loop until Ctrl-C
    Run {
        /// Stop after this many control cycles
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
    },
    /// Print the persisted remaining volumes
    State,
    /// Overwrite the persisted remaining volumes
    SetState {
        /// Litres left on the left channel
        #[arg(long, value_name = "LITRES")]
        left: f32,
        /// Litres left on the right channel
        #[arg(long, value_name = "LITRES")]
        right: f32,
    },
    /// Quick health check (config, storage and every device polled once)
    SelfCheck,
}

#[inline]
pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}
