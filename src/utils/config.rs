use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".divx", ".mp3", ".m4a", ".flac", ".wma",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base for relative watch and scan paths
    pub media_root: PathBuf,

    /// Where the persisted configuration record lives
    pub config_path: PathBuf,

    /// Media file extensions, lowercase with a leading dot
    pub extensions: Vec<String>,

    /// Pause before each remote rescan call
    pub scan_delay_ms: u64,

    /// Debounce cooldown used when none is given
    pub default_cooldown: u64,

    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("/media"),
            config_path: PathBuf::from("config.json"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            scan_delay_ms: 500,
            default_cooldown: 30,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from `.env` (if present) and the environment.
    pub fn load() -> Result<Self> {
        // a missing .env is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(root) = lookup("MEDIA_ROOT") {
            settings.media_root = PathBuf::from(root);
        }

        if let Some(path) = lookup("CONFIG_PATH") {
            settings.config_path = PathBuf::from(path);
        }

        if let Some(list) = lookup("SUPPORTED_EXTENSIONS") {
            settings.extensions = parse_extensions(&list);
        }

        if let Some(delay) = lookup("SCAN_DELAY_MS") {
            settings.scan_delay_ms = delay
                .trim()
                .parse()
                .with_context(|| format!("invalid SCAN_DELAY_MS '{}'", delay))?;
        }

        if let Some(cooldown) = lookup("COOLDOWN_SECONDS") {
            settings.default_cooldown = cooldown
                .trim()
                .parse()
                .with_context(|| format!("invalid COOLDOWN_SECONDS '{}'", cooldown))?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            settings.log_level = level;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            settings.log_format = match format.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }

        Ok(settings)
    }

    pub fn scan_delay(&self) -> Duration {
        Duration::from_millis(self.scan_delay_ms)
    }

    /// Joins a relative path onto `media_root`; absolute paths pass through.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.media_root.join(path)
    }
}

/// Splits a comma list into normalized extensions (`MKV` and `.mkv` both
/// become `.mkv`).
pub fn parse_extensions(list: &str) -> Vec<String> {
    let mut extensions = Vec::new();
    for raw in list.split(',') {
        let ext = raw.trim().trim_start_matches('.').to_lowercase();
        if ext.is_empty() {
            continue;
        }
        let ext = format!(".{}", ext);
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    extensions
}

pub fn load_settings() -> Result<Settings> {
    Settings::load()
}
