// src/config/model.rs

use serde::Deserialize;

use crate::types::OutputStream;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [nomad]
/// address = "http://127.0.0.1:4646"
/// namespace = "default"
///
/// [watch]
/// lines = 10
/// lines_timeout = "0.5s"
/// shutdown_timeout = "2s"
/// out = ["stdout", "stderr"]
///
/// [format]
/// timestamp = true
/// stdout = "{task}: {message}"
/// ```
///
/// Every section and key is optional. Values that need validation stay as
/// strings here and are checked when converting into [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub nomad: NomadSection,

    #[serde(default)]
    pub watch: RawWatchSection,

    #[serde(default)]
    pub format: FormatSection,
}

/// `[nomad]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NomadSection {
    pub address: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
}

/// `[watch]` section before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWatchSection {
    pub lines: Option<i64>,
    pub lines_timeout: Option<String>,
    pub shutdown_timeout: Option<String>,
    pub drain_timeout: Option<String>,
    pub poll_interval: Option<String>,
    pub polling: Option<bool>,
    pub max_retries: Option<u32>,
    pub backoff_initial: Option<String>,
    pub backoff_max: Option<String>,
    pub out: Option<Vec<OutputStream>>,
}

/// `[format]` section. Templates are parsed during validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatSection {
    pub alloc: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub eval: Option<String>,
    pub timestamp: Option<bool>,
    pub timestamp_format: Option<String>,
}

/// `[watch]` section with durations parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSection {
    pub lines: Option<i64>,
    pub lines_timeout: Option<std::time::Duration>,
    pub shutdown_timeout: Option<std::time::Duration>,
    pub drain_timeout: Option<std::time::Duration>,
    pub poll_interval: Option<std::time::Duration>,
    pub polling: Option<bool>,
    pub max_retries: Option<u32>,
    pub backoff_initial: Option<std::time::Duration>,
    pub backoff_max: Option<std::time::Duration>,
    pub out: Option<Vec<OutputStream>>,
}

/// Validated configuration file.
///
/// Only constructible through `TryFrom<RawConfigFile>` so a `ConfigFile`
/// always holds parseable durations and templates.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub nomad: NomadSection,
    pub watch: WatchSection,
    pub format: FormatSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        nomad: NomadSection,
        watch: WatchSection,
        format: FormatSection,
    ) -> Self {
        Self {
            nomad,
            watch,
            format,
        }
    }
}
