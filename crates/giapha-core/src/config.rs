//! Application configuration management.
//!
//! Holds the service URL, request timeout and cache timing. Stored at
//! `~/.config/giapha/config.json`; the `GIAPHA_API_URL` environment
//! variable overrides the service URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};

use crate::cache::EngineConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "giapha";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "GIAPHA_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Successful entries older than this are refetched on the next read.
const DEFAULT_STALE_AFTER_MINUTES: i64 = 5;

/// Unobserved entries idle this long are dropped by garbage collection.
const DEFAULT_GC_AFTER_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub stale_after_minutes: i64,
    pub gc_after_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            gc_after_minutes: DEFAULT_GC_AFTER_MINUTES,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Cache timing. Values too large for a duration fall back to the
    /// defaults; a non-positive `stale_after_minutes` disables aging.
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let stale_after = if self.stale_after_minutes > 0 {
            ChronoDuration::try_minutes(self.stale_after_minutes).or(defaults.stale_after)
        } else {
            None
        };
        let gc_after = ChronoDuration::try_minutes(self.gc_after_minutes.max(0))
            .unwrap_or(defaults.gc_after);
        EngineConfig {
            stale_after,
            gc_after,
        }
    }
}
