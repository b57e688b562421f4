use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Flat configuration record persisted between runs.
///
/// Older files used `paths`/`server`/`token`/`cooldown`; those keys are
/// still accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigRecord {
    #[serde(default, alias = "paths")]
    pub watched_paths: Vec<String>,
    #[serde(default, alias = "server")]
    pub remote_endpoint: Option<String>,
    #[serde(default, alias = "token")]
    pub credential: Option<String>,
    #[serde(default = "default_cooldown", alias = "cooldown")]
    pub cooldown_seconds: u64,
}

fn default_cooldown() -> u64 {
    30
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing was saved yet.
    pub async fn load(&self) -> Result<Option<ConfigRecord>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&data)?;
        Ok(Some(record))
    }

    pub async fn save(&self, record: &ConfigRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, data).await?;
        info!("Configuration written to {}", self.path.display());
        Ok(())
    }
}
