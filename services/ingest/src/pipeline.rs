//! The ingest pipeline: acquire, store, derive, persist.

use crate::config::{FetchConfig, IngestConfig, LimitsConfig};
use crate::derive::{DerivationEngine, RenditionSpec};
use crate::error::IngestError;
use crate::id::new_image_id;
use crate::source::{ImageSource, UploadSource, UrlSource};
use chrono::{SubsecRound, Utc};
use pictor_storage::{
    ImageRecord, MetadataRepository, OriginalStore, StorageConfig, StorageError, StorageLayout,
};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{error, info, instrument, Span};

/// Entry point for creating and reading images.
///
/// Construct once and share; every dependency is injected.
#[derive(Clone)]
pub struct ImagePipeline {
    originals: OriginalStore,
    engine: DerivationEngine,
    repository: Arc<dyn MetadataRepository>,
    client: reqwest::Client,
    page_size: i64,
}

impl ImagePipeline {
    /// Build a pipeline and create the storage directories.
    pub async fn new(
        storage: &StorageConfig,
        fetch: &FetchConfig,
        limits: &LimitsConfig,
        renditions: Vec<RenditionSpec>,
        repository: Arc<dyn MetadataRepository>,
    ) -> Result<Self, IngestError> {
        let layout = StorageLayout::new(
            storage.originals_root.clone(),
            renditions.iter().map(|r| r.name.clone()),
        );
        layout.ensure_dirs().await.map_err(IngestError::Storage)?;

        let client = reqwest::Client::builder()
            .connect_timeout(fetch.connect_timeout())
            .timeout(fetch.request_timeout())
            .user_agent(fetch.user_agent.as_str())
            .build()
            .map_err(IngestError::HttpClient)?;

        info!(
            root = %layout.root().display(),
            renditions = ?layout.renditions(),
            "Image pipeline ready"
        );

        Ok(Self {
            originals: OriginalStore::new(layout.clone()),
            engine: DerivationEngine::new(layout, renditions).with_max_pixels(limits.max_pixels),
            repository,
            client,
            page_size: storage.page_size,
        })
    }

    pub async fn from_config(
        config: &IngestConfig,
        repository: Arc<dyn MetadataRepository>,
    ) -> Result<Self, IngestError> {
        Self::new(
            &config.storage,
            &config.fetch,
            &config.limits,
            config.renditions.clone(),
            repository,
        )
        .await
    }

    pub fn layout(&self) -> &StorageLayout {
        self.originals.layout()
    }

    pub fn repository(&self) -> &Arc<dyn MetadataRepository> {
        &self.repository
    }

    /// Ingest an uploaded stream. `None` means the caller supplied nothing.
    pub async fn create_from_upload<R>(
        &self,
        owner_id: &str,
        description: &str,
        reader: Option<R>,
        declared_filename: &str,
    ) -> Result<ImageRecord, IngestError>
    where
        R: AsyncRead + Send + 'static,
    {
        let source = UploadSource::new(reader, declared_filename);
        self.ingest(owner_id, description, source).await
    }

    /// Fetch `url` and ingest the response body.
    pub async fn create_from_url(
        &self,
        owner_id: &str,
        description: &str,
        url: &str,
    ) -> Result<ImageRecord, IngestError> {
        let source = UrlSource::new(self.client.clone(), url);
        self.ingest(owner_id, description, source).await
    }

    /// Run the full pipeline for any source.
    ///
    /// The record is saved only after the original and every rendition are on
    /// disk. Files written before a failure are left in place.
    #[instrument(skip(self, description, source), fields(owner_id = %owner_id, image_id = tracing::field::Empty))]
    pub async fn ingest<S: ImageSource>(
        &self,
        owner_id: &str,
        description: &str,
        source: S,
    ) -> Result<ImageRecord, IngestError> {
        let id = new_image_id();
        Span::current().record("image_id", id.as_str());

        match self.run(id, owner_id, description, source).await {
            Ok(record) => {
                metrics::counter!("ingest.images.created").increment(1);
                info!(
                    storage_path = %record.storage_path,
                    bytes_written = record.size_bytes,
                    "Image ingested"
                );
                Ok(record)
            }
            Err(e) => {
                metrics::counter!("ingest.images.failed").increment(1);
                if e.is_user_error() {
                    info!(error = %e, "Image rejected");
                } else {
                    error!(error = %e, "Image ingest failed");
                }
                Err(e)
            }
        }
    }

    async fn run<S: ImageSource>(
        &self,
        id: String,
        owner_id: &str,
        description: &str,
        source: S,
    ) -> Result<ImageRecord, IngestError> {
        // Postgres keeps microseconds; truncate so stored and returned match.
        let created_at = Utc::now().trunc_subsecs(6);

        let mut acquired = source.acquire().await?;
        let stored = self
            .originals
            .write(&id, acquired.kind, &mut acquired.reader)
            .await
            .map_err(|e| match e {
                StorageError::SourceRead(source) => IngestError::SourceUnreachable(Box::new(source)),
                other => IngestError::StorageWriteFailed(other),
            })?;

        self.engine
            .derive(&stored.path, &stored.storage_path, acquired.kind)
            .await?;

        let record = ImageRecord {
            id,
            owner_id: owner_id.to_string(),
            display_name: acquired.display_name,
            storage_path: stored.storage_path,
            size_bytes: recorded_size(stored.bytes_written)?,
            description: description.to_string(),
            created_at,
        };

        self.repository
            .save(&record)
            .await
            .map_err(IngestError::PersistenceFailed)?;

        Ok(record)
    }

    /// Look up a record. `Ok(None)` when it does not exist.
    pub async fn find(&self, id: &str) -> Result<Option<ImageRecord>, IngestError> {
        self.repository.find(id).await.map_err(IngestError::Storage)
    }

    /// Zero-based `page` of all records, newest first.
    pub async fn list_page(&self, page: u32) -> Result<Vec<ImageRecord>, IngestError> {
        self.repository
            .list_page(self.offset(page), self.page_size)
            .await
            .map_err(IngestError::Storage)
    }

    /// Zero-based `page` of one owner's records, newest first.
    pub async fn list_page_by_owner(
        &self,
        owner_id: &str,
        page: u32,
    ) -> Result<Vec<ImageRecord>, IngestError> {
        self.repository
            .list_page_by_owner(owner_id, self.offset(page), self.page_size)
            .await
            .map_err(IngestError::Storage)
    }

    fn offset(&self, page: u32) -> i64 {
        i64::from(page).saturating_mul(self.page_size)
    }
}

fn recorded_size(bytes: u64) -> Result<i64, IngestError> {
    i64::try_from(bytes).map_err(|_| IngestError::OriginalTooLarge { bytes })
}
