//! Persistence of guard state across restarts
//!
//! The engine never touches storage. The bridge loads a [`GuardSnapshot`] at
//! startup and saves one at shutdown through a [`SenderStore`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use meshguard_core::GuardError;
use meshguard_engine::GuardSnapshot;

/// Key-value load/save of serialized sender records
#[async_trait]
pub trait SenderStore: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// `Ok(None)` means nothing has been saved yet
    async fn load(&self) -> Result<Option<GuardSnapshot>, GuardError>;

    async fn save(&self, snapshot: &GuardSnapshot) -> Result<(), GuardError>;
}

/// Pretty-printed JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SenderStore for JsonFileStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Option<GuardSnapshot>, GuardError> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "no saved state");
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let snapshot = serde_json::from_str(&content).map_err(|e| {
            GuardError::StorageUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &GuardSnapshot) -> Result<(), GuardError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| GuardError::StorageUnavailable(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // atomic replace
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            senders = snapshot.senders.len(),
            "state saved"
        );
        Ok(())
    }
}

/// Process-local store, mostly for tests and simulations
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<GuardSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GuardSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl SenderStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<Option<GuardSnapshot>, GuardError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, snapshot: &GuardSnapshot) -> Result<(), GuardError> {
        *self.slot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}
