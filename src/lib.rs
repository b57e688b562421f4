//! Watches local media folders and asks a Plex-compatible media server to
//! rescan only the movie or show folder that changed.

pub mod error;
pub mod library;
pub mod remote;
pub mod storage;
pub mod utils;
pub mod watcher;

pub use error::{Result, WatcherError};
pub use watcher::{WatcherService, WatcherState, WatcherStatus};
