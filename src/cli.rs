// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every mode is a subcommand; the shared flags are global so they can be
//! given before or after the mode.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::OutputStream;

/// Command-line arguments for `nomad-watch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nomad-watch",
    version,
    about = "Watch a Nomad job, stream its task logs, and exit with its status.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: WatchCommand,

    #[command(flatten)]
    pub watch: WatchArgs,

    #[command(flatten)]
    pub format: FormatArgs,

    /// Path to the config file (TOML).
    ///
    /// Falls back to `NOMAD_WATCH_CONFIG`. No config file is read otherwise.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `-v`/`-q`, then `NOMAD_WATCH_LOG`, then `info` are used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// More diagnostics on stderr. Repeatable.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Fewer diagnostics on stderr. Repeatable.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum WatchCommand {
    /// Watch one allocation until it is finished.
    Alloc {
        /// Allocation ID or unique prefix.
        allocid: String,
    },
    /// Register a job, watch it until it is dead, then stop it.
    Run {
        /// Job file path, `-` for stdin, or inline job text.
        jobfile: String,
    },
    /// Watch a job until it is dead.
    Job { jobid: String },
    /// Register a job and watch it until its main tasks have started.
    Start { jobfile: String },
    /// Watch a job until its main tasks have started.
    Started { jobid: String },
    /// Stop a job and watch it until it is dead.
    Stop { jobid: String },
    /// Watch a job until none of its allocations are pending or running.
    Stopped { jobid: String },
    /// Stop and purge a job and watch until the purge is observed.
    Purge { jobid: String },
}

impl WatchCommand {
    pub fn target(&self) -> &str {
        match self {
            WatchCommand::Alloc { allocid } => allocid,
            WatchCommand::Run { jobfile } | WatchCommand::Start { jobfile } => jobfile,
            WatchCommand::Job { jobid }
            | WatchCommand::Started { jobid }
            | WatchCommand::Stop { jobid }
            | WatchCommand::Stopped { jobid }
            | WatchCommand::Purge { jobid } => jobid,
        }
    }
}

/// Flags that shape what is watched and when the watch ends.
#[derive(Debug, Clone, Default, Args)]
pub struct WatchArgs {
    /// Nomad address. Overrides `NOMAD_ADDR`.
    #[arg(long, global = true, value_name = "URL")]
    pub address: Option<String>,

    /// Namespace of the job. Overrides `NOMAD_NAMESPACE`.
    #[arg(short = 'N', long, global = true)]
    pub namespace: Option<String>,

    /// Watch every allocation of the job, any version, until interrupted.
    #[arg(short, long, global = true)]
    pub all: bool,

    /// Output streams to print. Cumulative, comma separated.
    #[arg(short, long = "out", global = true, value_delimiter = ',', value_name = "STREAM")]
    pub out: Vec<OutputStream>,

    /// Only follow tasks whose name matches this regular expression.
    #[arg(short, long, global = true, value_name = "REGEX")]
    pub task: Option<String>,

    /// Historical lines per log: negative for all, 0 for none.
    #[arg(short = 'n', long, global = true, allow_negative_numbers = true)]
    pub lines: Option<i64>,

    /// How long to look for the last --lines lines before giving up.
    #[arg(long, global = true, value_name = "DURATION")]
    pub lines_timeout: Option<String>,

    /// How long to wait for log readers to flush when exiting.
    #[arg(long, global = true, value_name = "DURATION")]
    pub shutdown_timeout: Option<String>,

    /// How long readers of a finished task keep relaying.
    #[arg(long, global = true, value_name = "DURATION")]
    pub drain_timeout: Option<String>,

    /// Shorthand for --all --lines=10.
    #[arg(short, long, global = true)]
    pub follow: bool,

    /// Print what is available and exit after --shutdown-timeout.
    #[arg(long, global = true)]
    pub no_follow: bool,

    /// Poll the API instead of subscribing to the event stream.
    #[arg(long, global = true)]
    pub polling: bool,

    /// Exit 0 (2 when interrupted) instead of the tasks' exit status.
    #[arg(short = 'x', long, global = true)]
    pub no_preserve_status: bool,

    /// Do not stop the job when `run` finishes or is interrupted.
    #[arg(short, long, global = true)]
    pub detach: bool,

    /// Purge the job when stopping it.
    #[arg(long, global = true)]
    pub purge: bool,

    /// Purge the job only when it finished successfully.
    #[arg(long, global = true)]
    pub purge_successful: bool,

    /// JOBFILE is JSON rather than HCL.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Flags that shape how output lines are rendered.
#[derive(Debug, Clone, Default, Args)]
pub struct FormatArgs {
    /// Prefix every line with a timestamp.
    #[arg(short = 'T', long, global = true)]
    pub log_timestamp: bool,

    /// strftime format of the timestamp.
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_timestamp_format: Option<String>,

    /// Use a short `%H:%M:%S` timestamp. Implies --log-timestamp.
    #[arg(short = 'H', long, global = true)]
    pub log_timestamp_hour: bool,

    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub log_format_alloc: Option<String>,

    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub log_format_stdout: Option<String>,

    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub log_format_stderr: Option<String>,

    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub log_format_eval: Option<String>,

    /// Print the full allocation ID in the prefix.
    #[arg(long, global = true)]
    pub log_long_alloc: bool,

    /// Leave the task group out of the prefix.
    #[arg(long, global = true)]
    pub log_no_group: bool,

    /// Leave the task name out of the prefix.
    #[arg(long, global = true)]
    pub log_no_task: bool,

    /// Prefix lines with the task name only.
    #[arg(long, global = true)]
    pub log_only_task: bool,

    /// No prefix at all.
    #[arg(long, global = true)]
    pub log_none: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_after_the_mode() {
        let args = CliArgs::try_parse_from([
            "nomad-watch",
            "job",
            "example",
            "-o",
            "stdout,stderr",
            "--lines=-1",
            "-x",
        ])
        .unwrap();
        assert!(matches!(args.command, WatchCommand::Job { ref jobid } if jobid == "example"));
        assert_eq!(args.watch.out, vec![OutputStream::Stdout, OutputStream::Stderr]);
        assert_eq!(args.watch.lines, Some(-1));
        assert!(args.watch.no_preserve_status);
    }

    #[test]
    fn verbosity_counts() {
        let args = CliArgs::try_parse_from(["nomad-watch", "-vv", "alloc", "abc"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.command.target(), "abc");
    }
}
