use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the watcher core.
///
/// Configuration-time operations return these synchronously and leave the
/// service untouched. Event-time failures are logged by the caller instead.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("no library roots configured on the media server")]
    NoRootsConfigured,

    #[error("could not map '{path}' to any library root (available roots: {roots:?})")]
    PathNotMapped { path: PathBuf, roots: Vec<String> },

    #[error("no library section contains '{0}'")]
    NoMatchingLibrary(String),

    #[error("path '{0}' does not exist")]
    PathNotFound(PathBuf),

    #[error("path '{0}' is not being watched")]
    PathNotInSet(PathBuf),

    #[error("watcher is not configured, call configure() first")]
    NotConfigured,

    #[error("no paths configured, call add_path() first")]
    NoPathsConfigured,

    #[error("media server error: {0}")]
    RemoteConnectionError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WatcherError>;

impl WatcherError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteConnectionError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<reqwest::Error> for WatcherError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteConnectionError(err.to_string())
    }
}

impl From<notify::Error> for WatcherError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

impl From<serde_json::Error> for WatcherError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
