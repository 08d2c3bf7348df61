//! Write-once archive of raw API responses and fetch errors.
//!
//! Every fetch result is stored as its own file and never rewritten. The
//! archive is an audit trail only; the controller logs archive failures
//! and carries on.

use std::path::PathBuf;

use async_trait::async_trait;
use company_etl_ingest_models::RawBatch;
use tokio::io::AsyncWriteExt as _;

/// Errors from a [`ResponseArchive`].
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for [`RawBatch`]es.
#[async_trait]
pub trait ResponseArchive: Send + Sync {
    /// Stores `batch`. Never overwrites an earlier batch.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the batch could not be stored.
    async fn record(&self, batch: &RawBatch) -> Result<(), ArchiveError>;
}

/// File name for `batch`: `{key}_batch-{offset}-{millis}.json` for responses,
/// `error-{key}-{offset}-{millis}.json` for failures.
#[must_use]
pub fn archive_file_name(batch: &RawBatch) -> String {
    let millis = batch.captured_at.timestamp_millis();
    if batch.is_error() {
        format!("error-{}-{}-{millis}.json", batch.unit_key, batch.offset)
    } else {
        format!("{}_batch-{}-{millis}.json", batch.unit_key, batch.offset)
    }
}

/// Archives each batch as a pretty-printed JSON file under a directory.
#[derive(Debug, Clone)]
pub struct FileArchive {
    dir: PathBuf,
}

impl FileArchive {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ResponseArchive for FileArchive {
    async fn record(&self, batch: &RawBatch) -> Result<(), ArchiveError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(archive_file_name(batch));
        let bytes = serde_json::to_vec_pretty(batch)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        log::trace!("Archived {}", path.display());
        Ok(())
    }
}

/// Discards every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArchive;

#[async_trait]
impl ResponseArchive for NullArchive {
    async fn record(&self, _batch: &RawBatch) -> Result<(), ArchiveError> {
        Ok(())
    }
}
