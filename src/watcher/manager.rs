use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::adapter::{AdapterFactory, NotifyAdapterFactory, WatchAdapter};
use super::coordinator::RescanCoordinator;
use super::handler::EventHandler;
use super::{ScanFailure, ScanReport, WatcherConfig, WatcherState, WatcherStatus};
use crate::error::{Result, WatcherError};
use crate::library::{map_path, MapMode};
use crate::remote::{LibraryScanner, PlexConnector, ServerConnector};
use crate::storage::{ConfigRecord, ConfigStore};
use crate::utils::config::Settings;

struct WatchSession {
    adapter: Arc<dyn WatchAdapter>,
    pump: JoinHandle<()>,
}

struct Inner {
    state: WatcherState,
    config: WatcherConfig,
    coordinator: Option<RescanCoordinator>,
    session: Option<WatchSession>,
}

/// Owns the remote binding, the watched-path set and the watch session.
///
/// Lifecycle operations (`configure`, `update_configuration`, `start`,
/// `stop`) are serialized; queries never wait on them.
#[derive(Clone)]
pub struct WatcherService {
    settings: Arc<Settings>,
    connector: Arc<dyn ServerConnector>,
    adapters: Arc<dyn AdapterFactory>,
    store: ConfigStore,
    inner: Arc<Mutex<Inner>>,
    lifecycle: Arc<tokio::sync::Mutex<()>>,
}

impl WatcherService {
    pub fn new(
        settings: Settings,
        connector: Arc<dyn ServerConnector>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        let store = ConfigStore::new(settings.config_path.clone());
        let config = WatcherConfig {
            cooldown_seconds: settings.default_cooldown,
            ..Default::default()
        };
        Self {
            settings: Arc::new(settings),
            connector,
            adapters,
            store,
            inner: Arc::new(Mutex::new(Inner {
                state: WatcherState::Unconfigured,
                config,
                coordinator: None,
                session: None,
            })),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Plex over HTTP with native filesystem notifications.
    pub fn with_defaults(settings: Settings) -> Self {
        Self::new(
            settings,
            Arc::new(PlexConnector),
            Arc::new(NotifyAdapterFactory),
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> WatcherState {
        self.inner.lock().state
    }

    pub fn get_status(&self) -> WatcherStatus {
        let inner = self.inner.lock();
        WatcherStatus {
            state: inner.state,
            is_watching: inner.state == WatcherState::Watching,
            paths: inner
                .config
                .watched_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            server: inner.config.remote_endpoint.clone(),
            cooldown_seconds: inner.config.cooldown_seconds,
        }
    }

    /// Binds the service to a media server. A running watcher is stopped.
    pub async fn configure(
        &self,
        endpoint: &str,
        credential: &str,
        cooldown_seconds: u64,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let scanner = self.connect(endpoint, credential).await?;
        self.apply(scanner, endpoint, credential, cooldown_seconds, None).await;
        info!(
            "Watcher configured. Server: {}, Cooldown: {}s",
            endpoint, cooldown_seconds
        );
        Ok(())
    }

    /// Replaces the remote binding and the whole watched-path set at once.
    ///
    /// Every path is checked before anything changes; the first missing
    /// one aborts the update.
    pub async fn update_configuration<P: AsRef<Path>>(
        &self,
        endpoint: &str,
        credential: &str,
        paths: &[P],
        cooldown_seconds: u64,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let mut validated = BTreeSet::new();
        for path in paths {
            validated.insert(self.resolve_existing(path.as_ref())?);
        }

        let scanner = self.connect(endpoint, credential).await?;
        let count = validated.len();
        self.apply(scanner, endpoint, credential, cooldown_seconds, Some(validated)).await;
        info!(
            "Configuration updated: Server={}, Paths={}, Cooldown={}s",
            endpoint, count, cooldown_seconds
        );
        Ok(())
    }

    /// Adds a directory to the watch set, resolved against the media root.
    ///
    /// Takes effect on the next `start()`.
    pub fn add_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let resolved = self.resolve_existing(path.as_ref())?;
        self.inner
            .lock()
            .config
            .watched_paths
            .insert(resolved.clone());
        info!("Added path to watch: {}", resolved.display());
        Ok(resolved)
    }

    pub fn remove_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let resolved = self.settings.resolve(path.as_ref());
        let canonical = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());

        let mut inner = self.inner.lock();
        let paths = &mut inner.config.watched_paths;
        if paths.remove(&canonical) || paths.remove(&resolved) {
            info!("Removed path from watch: {}", canonical.display());
            Ok(())
        } else {
            Err(WatcherError::PathNotInSet(resolved))
        }
    }

    /// Begins watching every path in the set. No-op when already watching.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let (coordinator, paths) = {
            let inner = self.inner.lock();
            if inner.state == WatcherState::Watching {
                return Ok(());
            }
            let coordinator = inner
                .coordinator
                .clone()
                .ok_or(WatcherError::NotConfigured)?;
            if inner.config.watched_paths.is_empty() {
                return Err(WatcherError::NoPathsConfigured);
            }
            (coordinator, inner.config.watched_paths.clone())
        };

        let server = coordinator.scanner().server().clone();
        if !server.test_connection().await {
            return Err(WatcherError::remote(format!(
                "media server at {} is unreachable",
                server.endpoint()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = self.adapters.create(tx)?;
        if let Err(e) = schedule_all(adapter.as_ref(), &paths) {
            adapter.stop();
            return Err(e);
        }

        let handler = Arc::new(EventHandler::new(
            coordinator,
            adapter.clone(),
            self.settings.extensions.clone(),
        ));
        let pump = tokio::spawn(handler.run(rx));

        {
            let mut inner = self.inner.lock();
            inner.session = Some(WatchSession { adapter, pump });
            inner.state = WatcherState::Watching;
        }
        info!("Watcher started. Watching ({}) paths.", paths.len());

        if let Err(e) = self.persist().await {
            warn!("Failed to save configuration: {}", e);
        }
        Ok(())
    }

    /// Stops watching and drops pending rescans. No-op unless watching.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.stop_session().await {
            info!("Watcher stopped.");
        }
    }

    /// `stop()` followed by `start()`.
    pub async fn restart(&self) -> Result<()> {
        self.stop().await;
        self.start().await
    }

    /// Rescans one local path right away, bypassing the debounce.
    pub async fn scan_path(&self, path: impl AsRef<Path>) -> Result<String> {
        let scanner = self.scanner()?;
        self.scan_local(&scanner, path.as_ref()).await
    }

    /// Rescans each path right away; failures are collected per path.
    pub async fn scan_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ScanReport> {
        let scanner = self.scanner()?;
        Ok(self.scan_batch(&scanner, paths).await)
    }

    /// Like [`scan_paths`](Self::scan_paths) against a freshly connected
    /// server, leaving the service's own binding alone.
    pub async fn scan_paths_with<P: AsRef<Path>>(
        &self,
        endpoint: &str,
        credential: &str,
        paths: &[P],
    ) -> Result<ScanReport> {
        if paths.is_empty() {
            info!("No paths provided for manual scan.");
            return Ok(ScanReport::default());
        }
        let scanner = self.connect(endpoint, credential).await?;
        Ok(self.scan_batch(&scanner, paths).await)
    }

    /// Whether the server at `endpoint` answers with this credential.
    pub async fn test_connection(&self, endpoint: &str, credential: &str) -> bool {
        match self.connector.connect(endpoint, credential).await {
            Ok(server) => server.test_connection().await,
            Err(e) => {
                warn!("Connection test for {} failed: {}", endpoint, e);
                false
            }
        }
    }

    /// Loads the persisted record, if any, and applies it.
    ///
    /// Paths that no longer exist are skipped. Returns whether a record was
    /// found.
    pub async fn restore(&self) -> Result<bool> {
        let Some(record) = self.store.load().await? else {
            info!("No saved configuration at {}", self.store.path().display());
            return Ok(false);
        };

        for path in &record.watched_paths {
            if let Err(e) = self.add_path(path) {
                warn!("Skipping saved path '{}': {}", path, e);
            }
        }

        match (&record.remote_endpoint, &record.credential) {
            (Some(endpoint), Some(credential))
                if !endpoint.is_empty() && !credential.is_empty() =>
            {
                self.configure(endpoint, credential, record.cooldown_seconds).await?;
            }
            _ => {
                self.inner.lock().config.cooldown_seconds = record.cooldown_seconds;
            }
        }

        info!("Watcher configuration loaded from {}", self.store.path().display());
        Ok(true)
    }

    async fn connect(&self, endpoint: &str, credential: &str) -> Result<LibraryScanner> {
        LibraryScanner::connect(
            self.connector.as_ref(),
            endpoint,
            credential,
            self.settings.scan_delay(),
        )
        .await
    }

    /// Caller holds the lifecycle lock.
    async fn apply(
        &self,
        scanner: LibraryScanner,
        endpoint: &str,
        credential: &str,
        cooldown_seconds: u64,
        paths: Option<BTreeSet<PathBuf>>,
    ) {
        self.stop_session().await;

        let coordinator = RescanCoordinator::new(scanner, Duration::from_secs(cooldown_seconds));
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.coordinator.replace(coordinator) {
            previous.stop();
        }
        inner.config.remote_endpoint = Some(endpoint.to_string());
        inner.config.credential = Some(credential.to_string());
        inner.config.cooldown_seconds = cooldown_seconds;
        if let Some(paths) = paths {
            inner.config.watched_paths = paths;
        }
        inner.state = WatcherState::Configured;
    }

    /// Tears down the current session. Caller holds the lifecycle lock.
    async fn stop_session(&self) -> bool {
        let (session, coordinator) = {
            let mut inner = self.inner.lock();
            if inner.state != WatcherState::Watching {
                return false;
            }
            inner.state = WatcherState::Stopped;
            (inner.session.take(), inner.coordinator.clone())
        };

        if let Some(session) = session {
            session.adapter.stop();
            session.pump.abort();
            // cancelled is the expected outcome
            let _ = session.pump.await;
        }
        // last, so nothing re-arms the timer afterwards
        if let Some(coordinator) = coordinator {
            coordinator.stop();
        }
        true
    }

    fn scanner(&self) -> Result<LibraryScanner> {
        self.inner
            .lock()
            .coordinator
            .as_ref()
            .map(|c| c.scanner().clone())
            .ok_or(WatcherError::NotConfigured)
    }

    async fn scan_local(&self, scanner: &LibraryScanner, path: &Path) -> Result<String> {
        let local = self.resolve_existing(path)?;
        let remote = map_path(&local, scanner.index(), MapMode::Existing)?;
        info!("Manual scan initiated for path: {}", local.display());
        scanner.scan(&remote).await?;
        Ok(remote.to_string())
    }

    async fn scan_batch<P: AsRef<Path>>(
        &self,
        scanner: &LibraryScanner,
        paths: &[P],
    ) -> ScanReport {
        let mut report = ScanReport::default();
        if paths.is_empty() {
            info!("No paths provided for manual scan.");
            return report;
        }

        info!("Starting manual scan for {} paths.", paths.len());
        for path in paths {
            let path = path.as_ref();
            match self.scan_local(scanner, path).await {
                Ok(remote) => report.scanned.push(remote),
                Err(e) => {
                    warn!("Manual scan of '{}' failed: {}", path.display(), e);
                    report.errors.push(ScanFailure {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        info!("Manual scan completed.");
        report
    }

    fn resolve_existing(&self, path: &Path) -> Result<PathBuf> {
        let resolved = self.settings.resolve(path);
        match resolved.canonicalize() {
            Ok(canonical) => Ok(canonical),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WatcherError::PathNotFound(resolved))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self) -> Result<()> {
        let record = {
            let inner = self.inner.lock();
            ConfigRecord {
                watched_paths: inner
                    .config
                    .watched_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
                remote_endpoint: inner.config.remote_endpoint.clone(),
                credential: inner.config.credential.clone(),
                cooldown_seconds: inner.config.cooldown_seconds,
            }
        };
        self.store.save(&record).await
    }
}

fn schedule_all(adapter: &dyn WatchAdapter, paths: &BTreeSet<PathBuf>) -> Result<()> {
    for path in paths {
        adapter.schedule(path, true)?;
    }
    adapter.start()
}
