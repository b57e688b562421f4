use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::adapter::{EventReceiver, FsEvent, WatchAdapter};
use super::coordinator::RescanCoordinator;
use crate::error::Result;
use crate::library::{classify, item_root, map_path, MapMode};

/// Turns filesystem events into debounced rescan requests.
pub struct EventHandler {
    coordinator: RescanCoordinator,
    adapter: Arc<dyn WatchAdapter>,
    extensions: Vec<String>,
}

impl EventHandler {
    /// `extensions` are lowercase with a leading dot.
    pub fn new(
        coordinator: RescanCoordinator,
        adapter: Arc<dyn WatchAdapter>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            coordinator,
            adapter,
            extensions,
        }
    }

    /// Drains `events` until every sender is gone.
    ///
    /// Handling stats the filesystem, so each event runs on the blocking
    /// pool; events are still handled one at a time, in order.
    pub async fn run(self: Arc<Self>, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            let this = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || this.handle(event)).await {
                error!("Event handler task failed: {}", e);
            }
        }
        debug!("Event channel closed");
    }

    /// Handles one event. Failures are logged; a bad event never stops
    /// the watcher.
    pub fn handle(&self, event: FsEvent) {
        match event {
            FsEvent::Created { path, is_dir: true } => self.watch_new_directory(&path),
            FsEvent::Created { path, .. } => self.on_file(&path, "CREATED", false),
            FsEvent::Modified { path, is_dir: false } => self.on_file(&path, "MODIFIED", false),
            FsEvent::Deleted { path, is_dir: false } => self.on_file(&path, "DELETED", true),
            FsEvent::Moved { to, is_dir: true, .. } => self.watch_new_directory(&to),
            FsEvent::Moved { from, to, .. } => {
                self.on_file(&from, "MOVED FROM", true);
                self.on_file(&to, "MOVED", false);
            }
            FsEvent::Modified { .. } | FsEvent::Deleted { .. } => {}
        }
    }

    pub fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn watch_new_directory(&self, dir: &Path) {
        match self.adapter.schedule(dir, true) {
            Ok(()) => info!("Watching new directory: {}", dir.display()),
            Err(e) => warn!("Failed to watch new directory {}: {}", dir.display(), e),
        }
    }

    fn on_file(&self, path: &Path, verb: &str, deleted: bool) {
        if !self.is_media_file(path) {
            debug!("Ignoring {} event for {}", verb, path.display());
            return;
        }
        if let Err(e) = self.submit(path, verb, deleted) {
            warn!("Skipping {} event for '{}': {}", verb, path.display(), e);
        }
    }

    fn submit(&self, path: &Path, verb: &str, deleted: bool) -> Result<()> {
        let index = self.coordinator.scanner().index();
        let kind = classify(path, index, deleted)?;
        let local_item = item_root(path, kind);
        let mode = if deleted {
            MapMode::Deleted
        } else {
            MapMode::Existing
        };
        let remote = map_path(&local_item, index, mode)?;

        if self.coordinator.request(remote.clone()) {
            info!("{}: {} -> {}", verb, path.display(), remote);
        } else {
            debug!("{}: {} already pending as {}", verb, path.display(), remote);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::RemotePath;
    use crate::remote::testing::{movies_and_tv, FakeConnector, FakeServer};
    use crate::remote::LibraryScanner;
    use crate::watcher::adapter::testing::ManualAdapter;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        handler: EventHandler,
        adapter: Arc<ManualAdapter>,
        coordinator: RescanCoordinator,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("Movies/Heat (1995)")).unwrap();
        std::fs::create_dir_all(root.join("Movies/Alien (1979)")).unwrap();
        std::fs::create_dir_all(root.join("TV/Dark/Season 1")).unwrap();

        let server = Arc::new(FakeServer::new(movies_and_tv()));
        let connector = FakeConnector::serving(server);
        let scanner = LibraryScanner::connect(&connector, "http://fake", "t", Duration::ZERO)
            .await
            .unwrap();
        let coordinator = RescanCoordinator::new(scanner, Duration::from_secs(30));
        let adapter = Arc::new(ManualAdapter::default());
        let handler = EventHandler::new(
            coordinator.clone(),
            adapter.clone(),
            vec![".mkv".to_string(), ".mp4".to_string()],
        );
        Fixture {
            _dir: dir,
            root,
            handler,
            adapter,
            coordinator,
        }
    }

    fn pending(coordinator: &RescanCoordinator) -> Vec<String> {
        coordinator.pending().iter().map(RemotePath::to_string).collect()
    }

    #[tokio::test]
    async fn test_episodes_collapse_onto_show_folder() {
        let fx = fixture().await;
        for name in ["S01E01.mkv", "S01E02.MKV"] {
            let file = fx.root.join("TV/Dark/Season 1").join(name);
            std::fs::write(&file, b"").unwrap();
            fx.handler.handle(FsEvent::Created {
                path: file,
                is_dir: false,
            });
        }
        assert_eq!(pending(&fx.coordinator), vec!["/data/TV/Dark"]);
        fx.coordinator.stop();
    }

    #[tokio::test]
    async fn test_deleted_episode_uses_structural_hints() {
        let fx = fixture().await;
        fx.handler.handle(FsEvent::Deleted {
            path: fx.root.join("TV/Dark/Season 2/S02E01.mkv"),
            is_dir: false,
        });
        assert_eq!(pending(&fx.coordinator), vec!["/data/TV/Dark"]);
        fx.coordinator.stop();
    }

    #[tokio::test]
    async fn test_non_media_files_are_ignored() {
        let fx = fixture().await;
        let nfo = fx.root.join("Movies/Heat (1995)/movie.nfo");
        std::fs::write(&nfo, b"").unwrap();
        fx.handler.handle(FsEvent::Modified {
            path: nfo,
            is_dir: false,
        });
        assert!(fx.coordinator.pending().is_empty());
        assert!(!fx.coordinator.is_armed());
    }

    #[tokio::test]
    async fn test_new_directory_is_scheduled() {
        let fx = fixture().await;
        let season = fx.root.join("TV/Dark/Season 2");
        fx.handler.handle(FsEvent::Created {
            path: season.clone(),
            is_dir: true,
        });
        assert_eq!(fx.adapter.watched_paths(), vec![season]);
        assert!(fx.coordinator.pending().is_empty());
    }

    #[tokio::test]
    async fn test_move_rescans_both_folders() {
        let fx = fixture().await;
        let to = fx.root.join("Movies/Alien (1979)/Alien.mp4");
        std::fs::write(&to, b"").unwrap();
        fx.handler.handle(FsEvent::Moved {
            from: fx.root.join("Movies/Heat (1995)/Alien.mp4"),
            to,
            is_dir: false,
        });
        assert_eq!(
            pending(&fx.coordinator),
            vec!["/data/Movies/Alien (1979)", "/data/Movies/Heat (1995)"]
        );
        fx.coordinator.stop();
    }

    #[tokio::test]
    async fn test_run_handles_events_off_the_runtime_until_closed() {
        let fx = fixture().await;
        let coordinator = fx.coordinator.clone();
        let handler = Arc::new(fx.handler);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let file = fx.root.join("Movies/Heat (1995)/Heat.mkv");
        std::fs::write(&file, b"").unwrap();
        tx.send(FsEvent::Created {
            path: fx.root.join("nowhere/else.mkv"),
            is_dir: false,
        })
        .unwrap();
        tx.send(FsEvent::Modified {
            path: file,
            is_dir: false,
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), handler.run(rx))
            .await
            .expect("run returns once the channel closes");
        assert_eq!(pending(&coordinator), vec!["/data/Movies/Heat (1995)"]);
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_unmappable_event_does_not_stop_handling() {
        let fx = fixture().await;
        fx.handler.handle(FsEvent::Deleted {
            path: PathBuf::from("/nowhere/at/all.mkv"),
            is_dir: false,
        });
        let file = fx.root.join("Movies/Heat (1995)/Heat.mkv");
        std::fs::write(&file, b"").unwrap();
        fx.handler.handle(FsEvent::Modified {
            path: file,
            is_dir: false,
        });
        assert_eq!(pending(&fx.coordinator), vec!["/data/Movies/Heat (1995)"]);
        fx.coordinator.stop();
    }
}
