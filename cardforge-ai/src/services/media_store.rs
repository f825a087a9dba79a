//! Media directory access for build runs
//!
//! Every asset has a deterministic filename, so concurrent card units never
//! contend for a path. Writes land in a temporary sibling first and are
//! renamed into place, so a reader never observes a half-written file.

use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{GenerationError, GenerationResult};

/// Shared `media/` directory of an export folder
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Create the media directory (and parents) if missing
    pub async fn ensure_dir(&self) -> GenerationResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            GenerationError::Io(format!(
                "Failed to create media directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Whether a non-empty file already exists under `filename`
    ///
    /// Zero-length files are leftovers of an interrupted write on a
    /// filesystem without atomic rename and are not reused.
    pub async fn exists(&self, filename: &str) -> bool {
        match tokio::fs::metadata(self.path(filename)).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Write `bytes` to `filename` via temp file + rename
    pub async fn write_atomic(&self, filename: &str, bytes: &[u8]) -> GenerationResult<PathBuf> {
        let final_path = self.path(filename);
        let temp_path = self
            .dir
            .join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(GenerationError::Io(format!(
                "Failed to write {}: {}",
                temp_path.display(),
                e
            )));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(GenerationError::Io(format!(
                "Failed to move media into {}: {}",
                final_path.display(),
                e
            )));
        }

        debug!(file = %filename, bytes = bytes.len(), "Media written");
        Ok(final_path)
    }
}
