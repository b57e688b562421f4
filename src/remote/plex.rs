//! Plex Media Server client.
//!
//! Only the three calls the watcher needs: list library sections, refresh a
//! path inside a section and a cheap identity probe.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::{MediaServer, ServerConnector};
use crate::error::{Result, WatcherError};
use crate::library::{LibraryCategory, LibrarySection, RemotePath};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 4 << 10;
const USER_AGENT: &str = concat!("plex-watcher/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<Directory>,
}

#[derive(Debug, Deserialize)]
struct Directory {
    key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "Location", default)]
    location: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    path: String,
}

pub struct PlexClient {
    base_url: String,
    client: reqwest::Client,
}

impl PlexClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            WatcherError::remote(format!("invalid server URL '{}': {}", base_url, e))
        })?;
        if parsed.host_str().is_none() {
            return Err(WatcherError::remote(format!(
                "invalid server URL, missing host: {}",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(token)
            .map_err(|_| WatcherError::remote("token contains invalid header characters"))?;
        headers.insert("X-Plex-Token", token);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self.client.get(self.url(path)).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(WatcherError::remote(format!(
                "GET {}: http {}: {}",
                path, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn list_library_roots(&self) -> Result<Vec<LibrarySection>> {
        let response: SectionsResponse = self
            .get("/library/sections", &[])
            .await?
            .json()
            .await
            .map_err(|e| WatcherError::remote(format!("decode library sections: {}", e)))?;

        Ok(response
            .media_container
            .directory
            .into_iter()
            .map(|dir| LibrarySection {
                id: dir.key,
                title: dir.title,
                category: LibraryCategory::from_section_type(&dir.kind),
                locations: dir.location.into_iter().map(|l| l.path).collect(),
            })
            .collect())
    }

    async fn rescan(&self, section_id: &str, path: &RemotePath) -> Result<()> {
        let path = path.to_string();
        debug!("Refreshing section {} at {}", section_id, path);
        self.get(
            &format!("/library/sections/{}/refresh", section_id),
            &[("path", path.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.get("/identity", &[]).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to connect to media server {}: {}", self.base_url, e);
                false
            }
        }
    }
}

/// Connects to real Plex servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlexConnector;

#[async_trait]
impl ServerConnector for PlexConnector {
    async fn connect(&self, endpoint: &str, credential: &str) -> Result<Arc<dyn MediaServer>> {
        Ok(Arc::new(PlexClient::new(endpoint, credential)?))
    }
}
