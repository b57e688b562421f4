use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Result, WatcherError};

/// A filesystem change as delivered to the watcher service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created { path: PathBuf, is_dir: bool },
    Modified { path: PathBuf, is_dir: bool },
    Deleted { path: PathBuf, is_dir: bool },
    Moved { from: PathBuf, to: PathBuf, is_dir: bool },
}

pub type EventSender = mpsc::UnboundedSender<FsEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<FsEvent>;

/// Source of filesystem events.
///
/// `stop` must release every [`EventSender`] the adapter holds so the
/// receiving loop sees the channel close.
pub trait WatchAdapter: Send + Sync {
    /// Adds a path; safe to call before or after `start`.
    fn schedule(&self, path: &Path, recursive: bool) -> Result<()>;

    fn start(&self) -> Result<()>;

    fn stop(&self);

    fn watched_paths(&self) -> Vec<PathBuf>;
}

/// Builds a fresh adapter per watch session.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, events: EventSender) -> Result<Arc<dyn WatchAdapter>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyAdapterFactory;

impl AdapterFactory for NotifyAdapterFactory {
    fn create(&self, events: EventSender) -> Result<Arc<dyn WatchAdapter>> {
        Ok(Arc::new(NotifyAdapter::new(events)))
    }
}

struct NotifyState {
    events: Option<EventSender>,
    watcher: Option<RecommendedWatcher>,
    scheduled: HashMap<PathBuf, RecursiveMode>,
}

/// Adapter backed by the platform's native watcher through `notify`.
pub struct NotifyAdapter {
    state: Mutex<NotifyState>,
}

impl NotifyAdapter {
    pub fn new(events: EventSender) -> Self {
        Self {
            state: Mutex::new(NotifyState {
                events: Some(events),
                watcher: None,
                scheduled: HashMap::new(),
            }),
        }
    }
}

impl WatchAdapter for NotifyAdapter {
    fn schedule(&self, path: &Path, recursive: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.scheduled.contains_key(path) {
            return Ok(());
        }
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        if let Some(watcher) = state.watcher.as_mut() {
            watcher.watch(path, mode)?;
        }
        state.scheduled.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.watcher.is_some() {
            return Ok(());
        }
        let tx = state
            .events
            .clone()
            .ok_or_else(|| WatcherError::Watch("adapter already stopped".to_string()))?;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for fs_event in translate(event) {
                    // receiver gone means the service is shutting down
                    let _ = tx.send(fs_event);
                }
            }
            Err(e) => warn!("Filesystem watcher error: {}", e),
        })?;

        for (path, mode) in &state.scheduled {
            watcher.watch(path, *mode)?;
        }
        state.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        // dropping the watcher joins its thread and releases the sender clone
        state.watcher = None;
        state.events = None;
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        self.state.lock().scheduled.keys().cloned().collect()
    }
}

/// Converts a raw `notify` event into zero or more [`FsEvent`]s.
pub fn translate(event: Event) -> Vec<FsEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(kind) => paths
            .into_iter()
            .map(|path| {
                let is_dir = kind == CreateKind::Folder || path.is_dir();
                FsEvent::Created { path, is_dir }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let mut paths = paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => {
                    let is_dir = to.is_dir();
                    vec![FsEvent::Moved { from, to, is_dir }]
                }
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .map(|path| FsEvent::Deleted { path, is_dir: false })
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    let is_dir = path.is_dir();
                    FsEvent::Created { path, is_dir }
                } else {
                    FsEvent::Deleted { path, is_dir: false }
                }
            })
            .collect(),
        EventKind::Modify(_) => paths
            .into_iter()
            .map(|path| {
                let is_dir = path.is_dir();
                FsEvent::Modified { path, is_dir }
            })
            .collect(),
        EventKind::Remove(kind) => paths
            .into_iter()
            .map(|path| FsEvent::Deleted {
                path,
                is_dir: kind == RemoveKind::Folder,
            })
            .collect(),
        other => {
            debug!("Ignoring filesystem event {:?}", other);
            Vec::new()
        }
    }
}
