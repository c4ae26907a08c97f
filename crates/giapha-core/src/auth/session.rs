use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Who this session belongs to: the user id when known, else the token.
    pub fn identity(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.token)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() > at).unwrap_or(false)
    }
}

/// Cloneable handle to the current session; clones observe the same state.
#[derive(Clone)]
pub struct Session {
    cache_dir: Option<PathBuf>,
    state: Arc<watch::Sender<Option<SessionData>>>,
}

impl Session {
    /// A session persisted under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(cache_dir),
            state: Arc::new(watch::Sender::new(None)),
        }
    }

    /// A session that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            cache_dir: None,
            state: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Load session from disk
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.session_path() else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_expired() {
            debug!("Stored session has expired");
            return Ok(false);
        }
        self.state.send_replace(Some(data));
        Ok(true)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.session_path() else {
            return Ok(());
        };
        if let Some(data) = self.state.borrow().as_ref() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Sign out and remove the stored session file
    pub fn clear(&self) -> Result<()> {
        self.sign_out();
        if let Some(path) = self.session_path() {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove session file")?;
            }
        }
        Ok(())
    }

    pub fn sign_in(&self, data: SessionData) {
        info!(user_id = ?data.user_id, "Signed in");
        self.state.send_replace(Some(data));
    }

    pub fn sign_out(&self) {
        if self.state.send_replace(None).is_some() {
            info!("Signed out");
        }
    }

    /// Get the bearer token if the session is valid
    pub fn token(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .filter(|d| !d.is_expired())
            .map(|d| d.token.clone())
    }

    /// Identity of a valid session; `None` when signed out or expired.
    pub fn identity(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .filter(|d| !d.is_expired())
            .map(|d| d.identity().to_string())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Receive a notification on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionData>> {
        self.state.subscribe()
    }

    fn session_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}
