//! Durable key/value storage for unit and campaign checkpoints.
//!
//! [`FileCheckpointStore`] keeps one JSON file per key and replaces it
//! atomically (temp file, fsync, rename), so a crash mid-write leaves the
//! previous checkpoint intact rather than a truncated one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use company_etl_ingest_models::{Campaign, UnitCheckpoint};
use serde_json::Value;
use tokio::io::AsyncWriteExt as _;

/// Key of the persisted [`Campaign`].
pub const CAMPAIGN_KEY: &str = "campaign";
/// Key of the persisted partition subdivision analysis.
pub const SUBDIVISION_KEY: &str = "subdivision_analysis";

/// Errors from a [`CheckpointStore`].
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable JSON storage keyed by string.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the value could not be persisted.
    async fn write(&self, key: &str, value: &Value) -> Result<(), CheckpointError>;

    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the value exists but cannot be read.
    async fn read(&self, key: &str) -> Result<Option<Value>, CheckpointError>;

    /// Removes every stored value.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if a value could not be removed.
    async fn clear(&self) -> Result<(), CheckpointError>;
}

/// Store key of the checkpoint for unit `unit_key`.
#[must_use]
pub fn unit_checkpoint_key(unit_key: &str) -> String {
    format!("checkpoint_{unit_key}")
}

// ── Typed helpers ────────────────────────────────────────────────────────

/// Loads the checkpoint of unit `unit_key`.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the stored value cannot be read or
/// decoded.
pub async fn load_unit(
    store: &dyn CheckpointStore,
    unit_key: &str,
) -> Result<Option<UnitCheckpoint>, CheckpointError> {
    store
        .read(&unit_checkpoint_key(unit_key))
        .await?
        .map(serde_json::from_value)
        .transpose()
        .map_err(CheckpointError::from)
}

/// Persists a unit checkpoint, overwriting the previous one.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the checkpoint could not be written.
pub async fn save_unit(
    store: &dyn CheckpointStore,
    checkpoint: &UnitCheckpoint,
) -> Result<(), CheckpointError> {
    let value = serde_json::to_value(checkpoint)?;
    store
        .write(&unit_checkpoint_key(&checkpoint.key), &value)
        .await
}

/// Loads the persisted campaign.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the stored value cannot be read or
/// decoded.
pub async fn load_campaign(
    store: &dyn CheckpointStore,
) -> Result<Option<Campaign>, CheckpointError> {
    store
        .read(CAMPAIGN_KEY)
        .await?
        .map(serde_json::from_value)
        .transpose()
        .map_err(CheckpointError::from)
}

/// Persists the campaign.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the campaign could not be written.
pub async fn save_campaign(
    store: &dyn CheckpointStore,
    campaign: &Campaign,
) -> Result<(), CheckpointError> {
    let value = serde_json::to_value(campaign)?;
    store.write(CAMPAIGN_KEY, &value).await
}

// ── File store ───────────────────────────────────────────────────────────

/// One `{key}.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn write(&self, key: &str, value: &Value) -> Result<(), CheckpointError> {
        let io = |source| CheckpointError::Io {
            key: key.to_string(),
            source,
        };
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io)?;
        file.write_all(&bytes).await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await.map_err(io)?;
        log::trace!("Wrote checkpoint {}", path.display());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, CheckpointError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        let io = |source| CheckpointError::Io {
            key: self.dir.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(io(source)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let path = entry.path();
            let is_checkpoint = path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "tmp");
            if is_checkpoint {
                tokio::fs::remove_file(&path).await.map_err(io)?;
            }
        }

        log::info!("Cleared checkpoints in {}", self.dir.display());
        Ok(())
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn write(&self, key: &str, value: &Value) -> Result<(), CheckpointError> {
        self.values().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, CheckpointError> {
        Ok(self.values().get(key).cloned())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        self.values().clear();
        Ok(())
    }
}
