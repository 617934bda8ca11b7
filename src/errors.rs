// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Errors are classified at the component boundary that detects them:
//! transport problems are retried, malformed payloads are skipped, and the
//! rest end the watch with exit code 1.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Connectivity loss or a 5xx from the control plane. Retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// 401/403 from the control plane. Retrying cannot succeed.
    #[error("Permission denied: {0}")]
    Unauthorized(String),

    /// The requested job or allocation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A payload that could not be decoded.
    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Gave up after {attempts} consecutive transport failures: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Ctrl-C arrived before there was anything to watch.
    #[error("Interrupted {0}")]
    Interrupted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// Whether the caller should retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WatchError::Transport(_) | WatchError::IoError(_))
    }
}

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return WatchError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                WatchError::Unauthorized(err.to_string())
            }
            Some(status) if status.as_u16() == 404 => WatchError::NotFound(err.to_string()),
            _ => WatchError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::Malformed(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for WatchError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        WatchError::Other(anyhow::anyhow!("internal channel closed"))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(WatchError::Transport("reset".into()).is_retryable());
        assert!(!WatchError::Unauthorized("403".into()).is_retryable());
        assert!(!WatchError::NotFound("job".into()).is_retryable());
        assert!(!WatchError::Malformed("{".into()).is_retryable());
    }
}
