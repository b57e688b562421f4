use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::library::RemotePath;
use crate::remote::LibraryScanner;

#[derive(Default)]
struct PendingState {
    pending: HashSet<RemotePath>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced or cancelled; a timer that
    /// wakes with a stale generation does nothing.
    generation: u64,
}

/// Debounces rescan requests.
///
/// Every request re-arms a single timer, so scans fire once the filesystem
/// has been quiet for `cooldown`, one call per distinct remote path.
#[derive(Clone)]
pub struct RescanCoordinator {
    cooldown: Duration,
    scanner: LibraryScanner,
    state: Arc<Mutex<PendingState>>,
}

impl RescanCoordinator {
    pub fn new(scanner: LibraryScanner, cooldown: Duration) -> Self {
        Self {
            cooldown,
            scanner,
            state: Arc::new(Mutex::new(PendingState::default())),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn scanner(&self) -> &LibraryScanner {
        &self.scanner
    }

    /// Queues `remote` and restarts the quiet-period timer.
    ///
    /// Returns false when the path was already pending. Must be called
    /// from within a tokio runtime.
    pub fn request(&self, remote: RemotePath) -> bool {
        let mut state = self.state.lock();
        let inserted = state.pending.insert(remote);

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let cooldown = self.cooldown;
        let this = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            this.fire(generation).await;
        }));

        inserted
    }

    /// Paths waiting for the timer, sorted.
    pub fn pending(&self) -> Vec<RemotePath> {
        let mut paths: Vec<RemotePath> = self.state.lock().pending.iter().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    /// Scans everything pending right away, cancelling the timer.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
            take_sorted(&mut state.pending)
        };
        self.run(batch).await;
    }

    /// Cancels the timer and drops pending paths without scanning them.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        if !state.pending.is_empty() {
            debug!("Dropping {} pending rescans", state.pending.len());
        }
        state.pending.clear();
    }

    async fn fire(&self, generation: u64) {
        let batch = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            // from here on nothing can abort this task
            state.timer = None;
            take_sorted(&mut state.pending)
        };
        self.run(batch).await;
    }

    async fn run(&self, batch: Vec<RemotePath>) {
        if batch.is_empty() {
            return;
        }
        for path in batch {
            if let Err(e) = self.scanner.scan(&path).await {
                error!("Error scanning '{}': {}", path, e);
            }
        }
        info!("Waiting for changes...");
    }
}

fn take_sorted(pending: &mut HashSet<RemotePath>) -> Vec<RemotePath> {
    let mut batch: Vec<RemotePath> = pending.drain().collect();
    batch.sort();
    batch
}
