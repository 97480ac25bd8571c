//! On-disk addressing for originals and renditions.
//!
//! ```text
//! {originals_root}/
//! ├── img_AbCdEf1234.jpg          original
//! ├── thumbnail/
//! │   └── img_AbCdEf1234.jpg      rendition, same filename
//! └── preview/
//!     └── img_AbCdEf1234.jpg
//! ```

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Directory layout shared by the original writer and the rendition writers.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    renditions: Vec<String>,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, renditions: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            renditions: renditions.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn renditions(&self) -> &[String] {
        &self.renditions
    }

    /// Path of the original for a storage path.
    pub fn original_path(&self, storage_path: &str) -> PathBuf {
        self.root.join(storage_path)
    }

    /// Directory holding one rendition kind.
    pub fn rendition_dir(&self, rendition: &str) -> PathBuf {
        self.root.join(rendition)
    }

    /// Path of a rendition for a storage path.
    pub fn rendition_path(&self, rendition: &str, storage_path: &str) -> PathBuf {
        self.rendition_dir(rendition).join(storage_path)
    }

    /// Create the originals root and every rendition directory.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        create_dir(&self.root).await?;
        for rendition in &self.renditions {
            create_dir(&self.rendition_dir(rendition)).await?;
        }
        debug!(renditions = self.renditions.len(), "Storage directories ready");
        Ok(())
    }
}

async fn create_dir(path: &Path) -> StorageResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| StorageError::DirectoryCreation {
            path: path.to_path_buf(),
            source,
        })
}
