// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `vgrid-events`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vgrid-events",
    version,
    about = "Monitor workspace files and run trigger rules on create, modify and delete.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the daemon config file (TOML).
    ///
    /// Default: `VgridEvents.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "VgridEvents.toml")]
    pub config: String,

    /// Run only the monitor for this top-level workspace (use "." for the
    /// root monitor that picks up new workspaces).
    #[arg(long, value_name = "NAME")]
    pub workspace: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VGRID_EVENTS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load config and all rule files, print the active rules, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
