// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

pub const CONFIG_ENV: &str = "NOMAD_WATCH_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate durations, templates and
/// numeric sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// The config file to read: `--config` if given, else `NOMAD_WATCH_CONFIG`.
///
/// Without either no file is read and built-in defaults apply.
pub fn config_path(cli: Option<&str>) -> Option<PathBuf> {
    cli.map(PathBuf::from).or_else(|| {
        std::env::var(CONFIG_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    })
}

/// Load the selected config file, or an empty one when none is selected.
pub fn load_optional(cli: Option<&str>) -> Result<ConfigFile> {
    match config_path(cli) {
        Some(path) => load_and_validate(path),
        None => Ok(ConfigFile::default()),
    }
}
