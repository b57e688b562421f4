pub mod adapter;
pub mod coordinator;
pub mod handler;
pub mod manager;

pub use adapter::{AdapterFactory, FsEvent, NotifyAdapterFactory, WatchAdapter};
pub use coordinator::RescanCoordinator;
pub use handler::EventHandler;
pub use manager::WatcherService;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Unconfigured,
    Configured,
    Watching,
    /// Same as `Configured`, reached through `stop()`.
    Stopped,
}

/// Remote binding and watch set of a service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WatcherConfig {
    pub remote_endpoint: Option<String>,
    pub credential: Option<String>,
    pub watched_paths: BTreeSet<PathBuf>,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub state: WatcherState,
    pub is_watching: bool,
    pub paths: Vec<String>,
    pub server: Option<String>,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScanFailure {
    pub path: String,
    pub message: String,
}

/// Outcome of an immediate batch scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub scanned: Vec<String>,
    pub errors: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
