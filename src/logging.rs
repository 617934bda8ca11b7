// src/logging.rs

//! Logging setup for `nomad-watch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. net `-v`/`-q` count, relative to `info`
//! 3. `NOMAD_WATCH_LOG` environment variable (e.g. "info", "debug")
//! 4. default to `info`
//!
//! Logs are sent to STDERR; stdout carries only the job's output lines.

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "NOMAD_WATCH_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbose: u8, quiet: u8) -> Result<()> {
    let level = resolve_level(
        cli_level,
        verbose,
        quiet,
        std::env::var(LOG_ENV).ok().as_deref(),
    );

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}

fn resolve_level(
    cli_level: Option<LogLevel>,
    verbose: u8,
    quiet: u8,
    env: Option<&str>,
) -> tracing::Level {
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }
    if verbose != 0 || quiet != 0 {
        return match i16::from(verbose) - i16::from(quiet) {
            i16::MIN..=-2 => tracing::Level::ERROR,
            -1 => tracing::Level::WARN,
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };
    }
    env.and_then(parse_level_str)
        .unwrap_or(tracing::Level::INFO)
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn flag_beats_counts_and_env() {
        assert_eq!(
            resolve_level(Some(LogLevel::Error), 2, 0, Some("trace")),
            Level::ERROR
        );
    }

    #[test]
    fn counts_are_relative_to_info() {
        assert_eq!(resolve_level(None, 1, 0, None), Level::DEBUG);
        assert_eq!(resolve_level(None, 3, 0, None), Level::TRACE);
        assert_eq!(resolve_level(None, 0, 1, None), Level::WARN);
        assert_eq!(resolve_level(None, 1, 3, None), Level::ERROR);
    }

    #[test]
    fn env_then_default() {
        assert_eq!(resolve_level(None, 0, 0, Some("warning")), Level::WARN);
        assert_eq!(resolve_level(None, 0, 0, Some("nonsense")), Level::INFO);
        assert_eq!(resolve_level(None, 0, 0, None), Level::INFO);
    }
}
