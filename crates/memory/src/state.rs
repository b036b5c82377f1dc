//! Live system state and user profile sources.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use voltwise_core::error::SourceError;
use voltwise_core::{SystemSnapshot, SystemStateSource, UserContextSource};

/// Holds the latest snapshot pushed by an in-process collector.
pub struct SharedSystemState {
    latest: RwLock<Option<SystemSnapshot>>,
}

impl SharedSystemState {
    pub fn new(initial: Option<SystemSnapshot>) -> Self {
        Self {
            latest: RwLock::new(initial),
        }
    }

    pub async fn update(&self, snapshot: SystemSnapshot) {
        *self.latest.write().await = Some(snapshot);
    }
}

#[async_trait]
impl SystemStateSource for SharedSystemState {
    fn name(&self) -> &str {
        "shared"
    }

    async fn snapshot(&self) -> Result<SystemSnapshot, SourceError> {
        self.latest
            .read()
            .await
            .clone()
            .ok_or_else(|| SourceError::Unavailable("no snapshot received yet".into()))
    }
}

/// Reads the JSON snapshot file maintained by the telemetry collectors.
pub struct FileSystemState {
    path: PathBuf,
}

impl FileSystemState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SystemStateSource for FileSystemState {
    fn name(&self) -> &str {
        "file"
    }

    async fn snapshot(&self) -> Result<SystemSnapshot, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

/// Per-session profiles with an optional fallback, from configuration.
pub struct ProfileDirectory {
    default_profile: Option<String>,
    profiles: HashMap<String, String>,
}

impl ProfileDirectory {
    pub fn new(default_profile: Option<String>, profiles: HashMap<String, String>) -> Self {
        Self {
            default_profile,
            profiles,
        }
    }
}

#[async_trait]
impl UserContextSource for ProfileDirectory {
    fn name(&self) -> &str {
        "config"
    }

    async fn profile(&self, session_id: &str) -> Result<Option<String>, SourceError> {
        Ok(self
            .profiles
            .get(session_id)
            .or(self.default_profile.as_ref())
            .cloned())
    }
}
