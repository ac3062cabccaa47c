//! Errors raised while resolving settings and installing logging.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value that parsed but cannot be used, such as a zero timeout.
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("Invalid log filter {filter:?}: {reason}")]
    LogFilter { filter: String, reason: String },

    /// A global subscriber was already installed.
    #[error("Tracing already initialised: {0}")]
    TracingInstalled(String),
}
