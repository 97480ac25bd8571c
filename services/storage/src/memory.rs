use crate::error::{StorageError, StorageResult};
use crate::metadata_store::MetadataRepository;
use crate::record::ImageRecord;
use async_trait::async_trait;
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local metadata repository.
///
/// Same ordering and paging rules as [`crate::PgMetadataStore`]; useful for
/// tests and embedded use where no database is available.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<Vec<ImageRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn newest_first(a: &ImageRecord, b: &ImageRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

fn page<'a>(
    records: impl Iterator<Item = &'a ImageRecord>,
    offset: i64,
    page_size: i64,
) -> Vec<ImageRecord> {
    let mut matching: Vec<&ImageRecord> = records.collect();
    matching.sort_by(|a, b| newest_first(a, b));
    matching
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(page_size.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataStore {
    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StorageError::Duplicate(record.id.clone()));
        }
        records.push(record.clone());
        debug!(image_id = %record.id, "Image record saved in memory");
        Ok(())
    }

    async fn find(&self, id: &str) -> StorageResult<Option<ImageRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list_page(&self, offset: i64, page_size: i64) -> StorageResult<Vec<ImageRecord>> {
        let records = self.records.read().await;
        Ok(page(records.iter(), offset, page_size))
    }

    async fn list_page_by_owner(
        &self,
        owner_id: &str,
        offset: i64,
        page_size: i64,
    ) -> StorageResult<Vec<ImageRecord>> {
        let records = self.records.read().await;
        Ok(page(
            records.iter().filter(|r| r.owner_id == owner_id),
            offset,
            page_size,
        ))
    }
}
