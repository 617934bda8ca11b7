// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, FormatSection, RawConfigFile, RawWatchSection, WatchSection};
use crate::errors::{Result, WatchError};
use crate::logs::format::{LineTemplate, validate_time_format};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let watch = validate_watch(&raw.watch)?;
        validate_format(&raw.format)?;
        validate_nomad(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.nomad, watch, raw.format))
    }
}

fn validate_nomad(cfg: &RawConfigFile) -> Result<()> {
    if let Some(address) = &cfg.nomad.address {
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(WatchError::ConfigError(format!(
                "[nomad].address must start with http:// or https:// (got '{address}')"
            )));
        }
    }
    Ok(())
}

fn validate_watch(raw: &RawWatchSection) -> Result<WatchSection> {
    let section = WatchSection {
        lines: raw.lines,
        lines_timeout: duration_field("lines_timeout", &raw.lines_timeout)?,
        shutdown_timeout: duration_field("shutdown_timeout", &raw.shutdown_timeout)?,
        drain_timeout: duration_field("drain_timeout", &raw.drain_timeout)?,
        poll_interval: duration_field("poll_interval", &raw.poll_interval)?,
        polling: raw.polling,
        max_retries: raw.max_retries,
        backoff_initial: duration_field("backoff_initial", &raw.backoff_initial)?,
        backoff_max: duration_field("backoff_max", &raw.backoff_max)?,
        out: raw.out.clone(),
    };

    if section.poll_interval == Some(Duration::ZERO) {
        return Err(WatchError::ConfigError(
            "[watch].poll_interval must be greater than zero".to_string(),
        ));
    }
    if section.backoff_initial == Some(Duration::ZERO) {
        return Err(WatchError::ConfigError(
            "[watch].backoff_initial must be greater than zero".to_string(),
        ));
    }
    if let (Some(initial), Some(max)) = (section.backoff_initial, section.backoff_max) {
        if max < initial {
            return Err(WatchError::ConfigError(format!(
                "[watch].backoff_max ({max:?}) must not be below backoff_initial ({initial:?})"
            )));
        }
    }

    Ok(section)
}

fn validate_format(raw: &FormatSection) -> Result<()> {
    for (name, template) in [
        ("alloc", &raw.alloc),
        ("stdout", &raw.stdout),
        ("stderr", &raw.stderr),
        ("eval", &raw.eval),
    ] {
        if let Some(template) = template {
            template.parse::<LineTemplate>().map_err(|e| {
                WatchError::ConfigError(format!("[format].{name}: {e}"))
            })?;
        }
    }
    if let Some(fmt) = &raw.timestamp_format {
        validate_time_format(fmt)
            .map_err(|e| WatchError::ConfigError(format!("[format].timestamp_format: {e}")))?;
    }
    Ok(())
}

fn duration_field(name: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| {
            parse_duration(s).map_err(|e| WatchError::ConfigError(format!("[watch].{name}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_text: &str) -> RawConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn durations_are_parsed() {
        let cfg = ConfigFile::try_from(raw(
            r#"
            [watch]
            lines_timeout = "250ms"
            shutdown_timeout = "3"
            "#,
        ))
        .unwrap();
        assert_eq!(cfg.watch.lines_timeout, Some(Duration::from_millis(250)));
        assert_eq!(cfg.watch.shutdown_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = ConfigFile::try_from(raw("[watch]\nlines_timeout = \"soon\"\n")).unwrap_err();
        assert!(err.to_string().contains("lines_timeout"));
    }

    #[test]
    fn rejects_bad_template() {
        let err = ConfigFile::try_from(raw("[format]\nstdout = \"{nope} {message}\"\n")).unwrap_err();
        assert!(err.to_string().contains("[format].stdout"));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let err = ConfigFile::try_from(raw(
            "[watch]\nbackoff_initial = \"5s\"\nbackoff_max = \"1s\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("backoff_max"));
    }

    #[test]
    fn rejects_non_http_address() {
        assert!(ConfigFile::try_from(raw("[nomad]\naddress = \"localhost:4646\"\n")).is_err());
    }
}
