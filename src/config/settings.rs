// src/config/settings.rs

//! Merge CLI flags, environment, config file and built-in defaults into the
//! settings the watch runs with.
//!
//! Precedence is CLI flag, then environment variable, then config file, then
//! default. `--follow` sets `lines = 10` and `--all` unless `--lines` is
//! given explicitly on the command line.

use std::time::Duration;

use regex::Regex;

use crate::cli::{CliArgs, FormatArgs, WatchArgs, WatchCommand};
use crate::config::model::ConfigFile;
use crate::errors::{Result, WatchError};
use crate::logs::format::{LineFormats, LineTemplate, PrefixOptions, validate_time_format};
use crate::source::BackoffPolicy;
use crate::types::{OutputSet, parse_duration};

pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:4646";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
pub const HOUR_TIME_FORMAT: &str = "%H:%M:%S";
const FOLLOW_LINES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomadSettings {
    pub address: String,
    pub token: Option<String>,
    pub namespace: String,
}

impl Default for NomadSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            token: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Everything that shapes one watch, independent of where it came from.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Historical lines per log: negative for all, zero for none.
    pub lines: i64,
    pub lines_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub drain_timeout: Duration,
    pub poll_interval: Duration,
    pub polling: bool,
    /// Consecutive transport failures tolerated before giving up.
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    pub all: bool,
    pub no_follow: bool,
    pub preserve_status: bool,
    pub detach: bool,
    pub purge: bool,
    pub purge_successful: bool,
    pub task_filter: Option<Regex>,
    pub outputs: OutputSet,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            lines: -1,
            lines_timeout: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            polling: false,
            max_retries: 10,
            backoff: BackoffPolicy::default(),
            all: false,
            no_follow: false,
            preserve_status: true,
            detach: false,
            purge: false,
            purge_successful: false,
            task_filter: None,
            outputs: OutputSet::ALL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub nomad: NomadSettings,
    pub watch: WatchSettings,
    pub format: LineFormats,
}

impl Settings {
    /// Resolve settings using the process environment.
    pub fn resolve(args: &CliArgs, file: &ConfigFile) -> Result<Self> {
        Self::resolve_with_env(args, file, |key| std::env::var(key).ok())
    }

    pub fn resolve_with_env(
        args: &CliArgs,
        file: &ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let nomad = resolve_nomad(&args.watch, file, &env);
        let mut watch = resolve_watch(&args.watch, file)?;
        if matches!(args.command, WatchCommand::Purge { .. }) {
            watch.purge = true;
        }
        let format = resolve_format(&args.format, file)?;
        Ok(Self {
            nomad,
            watch,
            format,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn resolve_nomad(
    cli: &WatchArgs,
    file: &ConfigFile,
    env: &impl Fn(&str) -> Option<String>,
) -> NomadSettings {
    let address = non_empty(cli.address.clone())
        .or_else(|| non_empty(env("NOMAD_ADDR")))
        .or_else(|| file.nomad.address.clone())
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let token = non_empty(env("NOMAD_TOKEN")).or_else(|| file.nomad.token.clone());
    let namespace = non_empty(cli.namespace.clone())
        .or_else(|| non_empty(env("NOMAD_NAMESPACE")))
        .or_else(|| file.nomad.namespace.clone())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    NomadSettings {
        address,
        token,
        namespace,
    }
}

fn cli_duration(name: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| parse_duration(s).map_err(|e| WatchError::ConfigError(format!("--{name}: {e}"))))
        .transpose()
}

fn resolve_watch(cli: &WatchArgs, file: &ConfigFile) -> Result<WatchSettings> {
    let defaults = WatchSettings::default();
    let fw = &file.watch;

    let mut lines = fw.lines.unwrap_or(defaults.lines);
    let mut all = cli.all;
    if cli.follow {
        lines = FOLLOW_LINES;
        all = true;
    }
    if let Some(explicit) = cli.lines {
        lines = explicit;
    }

    let task_filter = cli
        .task
        .as_deref()
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|e| WatchError::ConfigError(format!("--task: invalid regex: {e}")))
        })
        .transpose()?;

    let outputs = if !cli.out.is_empty() {
        OutputSet::from_selectors(&cli.out)
    } else if let Some(out) = &fw.out {
        OutputSet::from_selectors(out)
    } else {
        defaults.outputs
    };

    let backoff = BackoffPolicy::new(
        fw.backoff_initial.unwrap_or(defaults.backoff.initial),
        fw.backoff_max.unwrap_or(defaults.backoff.max),
    );

    Ok(WatchSettings {
        lines,
        lines_timeout: cli_duration("lines-timeout", &cli.lines_timeout)?
            .or(fw.lines_timeout)
            .unwrap_or(defaults.lines_timeout),
        shutdown_timeout: cli_duration("shutdown-timeout", &cli.shutdown_timeout)?
            .or(fw.shutdown_timeout)
            .unwrap_or(defaults.shutdown_timeout),
        drain_timeout: cli_duration("drain-timeout", &cli.drain_timeout)?
            .or(fw.drain_timeout)
            .unwrap_or(defaults.drain_timeout),
        poll_interval: fw.poll_interval.unwrap_or(defaults.poll_interval),
        polling: cli.polling || fw.polling.unwrap_or(defaults.polling),
        max_retries: fw.max_retries.unwrap_or(defaults.max_retries),
        backoff,
        all,
        no_follow: cli.no_follow,
        preserve_status: !cli.no_preserve_status,
        detach: cli.detach,
        purge: cli.purge,
        purge_successful: cli.purge_successful,
        task_filter,
        outputs,
    })
}

fn resolve_format(cli: &FormatArgs, file: &ConfigFile) -> Result<LineFormats> {
    let ff = &file.format;
    let prefix = PrefixOptions {
        timestamp: cli.log_timestamp || cli.log_timestamp_hour || ff.timestamp.unwrap_or(false),
        long_alloc: cli.log_long_alloc,
        no_group: cli.log_no_group,
        no_task: cli.log_no_task,
        only_task: cli.log_only_task,
        none: cli.log_none,
    };
    let mut formats = LineFormats::defaults(&prefix);

    let pick = |flag: &str, cli: &Option<String>, file: &Option<String>| -> Result<Option<LineTemplate>> {
        cli.as_ref()
            .or(file.as_ref())
            .map(|t| {
                t.parse::<LineTemplate>()
                    .map_err(|e| WatchError::ConfigError(format!("{flag}: {e}")))
            })
            .transpose()
    };
    if let Some(t) = pick("--log-format-alloc", &cli.log_format_alloc, &ff.alloc)? {
        formats.alloc = t;
    }
    if let Some(t) = pick("--log-format-stdout", &cli.log_format_stdout, &ff.stdout)? {
        formats.stdout = t;
    }
    if let Some(t) = pick("--log-format-stderr", &cli.log_format_stderr, &ff.stderr)? {
        formats.stderr = t;
    }
    if let Some(t) = pick("--log-format-eval", &cli.log_format_eval, &ff.eval)? {
        formats.eval = t;
    }

    let time_format = if cli.log_timestamp_hour {
        HOUR_TIME_FORMAT.to_string()
    } else {
        cli.log_timestamp_format
            .clone()
            .or_else(|| ff.timestamp_format.clone())
            .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string())
    };
    validate_time_format(&time_format)
        .map_err(|e| WatchError::ConfigError(format!("timestamp format: {e}")))?;
    formats.time_format = time_format;

    Ok(formats)
}
