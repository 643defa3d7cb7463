// src/logging.rs

//! Daemon log output through `tracing-subscriber`.
//!
//! `--log-level` wins and applies one level to every target. Without it,
//! `VGRID_EVENTS_LOG` is read as a list of filter directives, so a single
//! module can be turned up:
//!
//! ```text
//! VGRID_EVENTS_LOG="info,vgrid_events::engine=debug"
//! ```
//!
//! Level names are case-insensitive and `warning` is accepted for `warn`,
//! which is what rule owners tend to type. Anything unparseable falls back
//! to `info` with a warning once the subscriber is up.
//!
//! Daemon logs go to STDERR. Per-workspace audit lines for rule owners are
//! written separately by [`crate::engine::audit::WorkflowLog`].

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "VGRID_EVENTS_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let wanted = directives(cli_level, env.as_deref());
    let (filter, rejected) = match EnvFilter::try_new(&wanted) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new(DEFAULT_DIRECTIVES), Some(err)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    if let Some(err) = rejected {
        tracing::warn!(
            var = LOG_ENV_VAR,
            directives = %wanted,
            error = %err,
            "bad log filter; logging at info"
        );
    }
    Ok(())
}

fn directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    match (cli_level, env.map(str::trim)) {
        (Some(lvl), _) => level_name(lvl).to_string(),
        (None, Some(raw)) if !raw.is_empty() => normalize_directives(raw),
        _ => DEFAULT_DIRECTIVES.to_string(),
    }
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Canonical spelling of a level word, if `word` is one.
fn canonical_level(word: &str) -> Option<&'static str> {
    match word.trim().to_ascii_lowercase().as_str() {
        "off" => Some("off"),
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

/// Rewrite the level part of each comma-separated directive. Targets and
/// span filters are passed through untouched.
fn normalize_directives(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|directive| {
            if let Some(level) = canonical_level(directive) {
                return level.to_string();
            }
            match directive.rsplit_once('=') {
                Some((target, level)) => match canonical_level(level) {
                    Some(level) => format!("{target}={level}"),
                    None => directive.to_string(),
                },
                None => directive.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_overrides_environment() {
        assert_eq!(directives(Some(LogLevel::Debug), Some("trace")), "debug");
        assert_eq!(directives(None, None), "info");
        assert_eq!(directives(None, Some("   ")), "info");
    }

    #[test]
    fn env_directives_accept_warning_spelling() {
        assert_eq!(normalize_directives("WARNING"), "warn");
        assert_eq!(
            normalize_directives(" info , vgrid_events::engine=Warning "),
            "info,vgrid_events::engine=warn"
        );
        assert_eq!(
            normalize_directives("vgrid_events[dispatch{rule_id=x}]"),
            "vgrid_events[dispatch{rule_id=x}]"
        );
    }

    #[test]
    fn normalized_directives_build_a_filter() {
        let raw = normalize_directives("Debug,vgrid_events::watch=warning");
        assert!(EnvFilter::try_new(&raw).is_ok(), "{raw}");
    }
}
