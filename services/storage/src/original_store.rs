use crate::error::{StorageError, StorageResult};
use crate::layout::StorageLayout;
use crate::media_type::ImageKind;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Result of persisting an original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOriginal {
    /// `id` plus canonical extension
    pub storage_path: String,
    /// Absolute or root-relative location on disk
    pub path: PathBuf,
    /// Exact number of bytes copied from the source
    pub bytes_written: u64,
}

/// Writes original image bytes under the originals root.
#[derive(Debug, Clone)]
pub struct OriginalStore {
    layout: StorageLayout,
}

impl OriginalStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Stream `reader` to `{root}/{id}{ext}`, replacing any existing file.
    ///
    /// Read errors are reported as [`StorageError::SourceRead`], write errors
    /// as [`StorageError::WriteFailed`].
    #[instrument(skip(self, reader), fields(image_id = %id, kind = %kind))]
    pub async fn write<R>(&self, id: &str, kind: ImageKind, reader: &mut R) -> StorageResult<StoredOriginal>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let storage_path = format!("{}{}", id, kind.extension());
        let path = self.layout.original_path(&storage_path);

        let write_failed = |source: std::io::Error| StorageError::WriteFailed {
            path: path.clone(),
            source,
        };

        let mut file = File::create(&path).await.map_err(write_failed)?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut bytes_written: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await.map_err(StorageError::SourceRead)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await.map_err(write_failed)?;
            bytes_written += n as u64;
        }
        file.flush().await.map_err(write_failed)?;
        drop(file);

        debug!(
            path = %path.display(),
            bytes_written = bytes_written,
            "Original stored"
        );

        Ok(StoredOriginal {
            storage_path,
            path,
            bytes_written,
        })
    }
}
