pub mod plex;

pub use plex::{PlexClient, PlexConnector};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::library::{LibraryIndex, LibrarySection, RemotePath};

/// The slice of the media server the watcher depends on.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Base URL, for status reporting.
    fn endpoint(&self) -> &str;

    async fn list_library_roots(&self) -> Result<Vec<LibrarySection>>;

    /// Asks the server to rescan `path` inside section `section_id`.
    async fn rescan(&self, section_id: &str, path: &RemotePath) -> Result<()>;

    async fn test_connection(&self) -> bool;
}

/// Opens a [`MediaServer`] for an endpoint and credential.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    async fn connect(&self, endpoint: &str, credential: &str) -> Result<Arc<dyn MediaServer>>;
}

/// A connected server together with the library roots it reported.
#[derive(Clone)]
pub struct LibraryScanner {
    server: Arc<dyn MediaServer>,
    index: Arc<LibraryIndex>,
    scan_delay: Duration,
}

impl LibraryScanner {
    /// Connects and builds the library index from the reported sections.
    pub async fn connect(
        connector: &dyn ServerConnector,
        endpoint: &str,
        credential: &str,
        scan_delay: Duration,
    ) -> Result<Self> {
        let server = connector.connect(endpoint, credential).await?;
        let sections = server.list_library_roots().await?;
        let index = LibraryIndex::build(&sections);
        if index.is_empty() {
            warn!("Media server at {} reported no library locations", endpoint);
        }
        Ok(Self {
            server,
            index: Arc::new(index),
            scan_delay,
        })
    }

    pub fn server(&self) -> &Arc<dyn MediaServer> {
        &self.server
    }

    pub fn index(&self) -> &Arc<LibraryIndex> {
        &self.index
    }

    /// Rescans `remote` in the section owning it.
    ///
    /// Waits `scan_delay` first; the server throttles bursts of refreshes.
    pub async fn scan(&self, remote: &RemotePath) -> Result<()> {
        let root = self.index.find_root(remote)?;
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        self.server.rescan(&root.section_id, remote).await?;
        info!("Scanning section '{}' for {}", root.section_title, remote);
        Ok(())
    }
}
