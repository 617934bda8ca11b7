// src/config/mod.rs

//! Configuration loading and validation for nomad-watch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate durations and templates (`validate.rs`).
//! - Merge CLI, environment, file and defaults (`settings.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_optional};
pub use model::{ConfigFile, RawConfigFile};
pub use settings::{NomadSettings, Settings, WatchSettings};
