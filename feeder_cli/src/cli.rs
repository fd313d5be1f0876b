//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "feeder", version, about = "Pellet feeder CLI")]
pub struct Cli {
    /// Path to config TOML; built-in firmware defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Options shared by the commands that drive the carousel.
#[derive(clap::Args, Debug, Clone)]
pub struct RigArgs {
    /// Append behavioural events to this CSV (overrides [logging].events_csv)
    #[arg(long, value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Sync pulse width emitted with each pellet, in ms (0 disables)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub pulse_ms: u64,

    /// Run the simulated rig against wall-clock time instead of virtual time
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Run the simulated rig in real time.\n\nBy default the simulator advances a virtual clock, so a session that would take minutes on the bench finishes instantly. With --realtime every wait really sleeps. Ignored with the hardware backend, which is always real time."
    )]
    pub realtime: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispense pellets, waiting for each to be taken
    Feed {
        /// Number of pellets to dispense
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[command(flatten)]
        rig: RigArgs,
    },
    /// Free feeding: refill the well whenever the pellet is taken
    Serve {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECONDS")]
        duration_s: Option<u64>,
        #[command(flatten)]
        rig: RigArgs,
    },
    /// Print the jam-recovery tier for a range of failed turns
    JamSchedule {
        #[arg(long, default_value_t = 1)]
        from: u32,
        #[arg(long, default_value_t = 40)]
        to: u32,
    },
    /// Quick health check (config, input lines, motor driver)
    SelfCheck,
}
