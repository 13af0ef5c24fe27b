/*!
Error types shared by the deletion monitor components
*/

use thiserror::Error;

/// Errors raised while configuring or running the monitor.
///
/// Only configuration and startup errors are fatal. Everything raised inside a
/// polling cycle is logged by the tracker or the output manager and dropped.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid or inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The watched directory is missing or not a directory
    #[error("watched path {0} does not exist or is not a directory")]
    WatchTargetMissing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A webhook or remote site answered with a non-2xx status
    #[error("unexpected response status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An external tool could not be run or timed out
    #[error("command `{program}` failed: {reason}")]
    Command { program: String, reason: String },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
