use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::record::ImageRecord;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

/// Durable, queryable store of finished image records.
///
/// Listings are ordered by `created_at` descending, ties broken by `id`
/// descending. A missing record is `Ok(None)`; `Err` always means the store
/// itself failed.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Persist a new record.
    async fn save(&self, record: &ImageRecord) -> StorageResult<()>;

    /// Look up a record by ID.
    async fn find(&self, id: &str) -> StorageResult<Option<ImageRecord>>;

    /// One page of all records, newest first.
    async fn list_page(&self, offset: i64, page_size: i64) -> StorageResult<Vec<ImageRecord>>;

    /// One page of a single owner's records, newest first.
    async fn list_page_by_owner(
        &self,
        owner_id: &str,
        offset: i64,
        page_size: i64,
    ) -> StorageResult<Vec<ImageRecord>>;
}

/// Metadata store for image records in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Metadata store closed");
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MetadataRepository for PgMetadataStore {
    #[instrument(skip(self, record), fields(image_id = %record.id, owner_id = %record.owner_id))]
    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO images (
                id, owner_id, display_name, storage_path,
                size_bytes, description, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.display_name)
        .bind(&record.storage_path)
        .bind(record.size_bytes)
        .bind(&record.description)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StorageError::Duplicate(record.id.clone())
            }
            other => StorageError::Database(other),
        })?;

        debug!(storage_path = %record.storage_path, "Image record saved");
        metrics::counter!("storage.images.saved").increment(1);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, id: &str) -> StorageResult<Option<ImageRecord>> {
        let record = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, owner_id, display_name, storage_path,
                   size_bytes, description, created_at
            FROM images
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_page(&self, offset: i64, page_size: i64) -> StorageResult<Vec<ImageRecord>> {
        let records = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, owner_id, display_name, storage_path,
                   size_bytes, description, created_at
            FROM images
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page_size.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    #[instrument(skip(self))]
    async fn list_page_by_owner(
        &self,
        owner_id: &str,
        offset: i64,
        page_size: i64,
    ) -> StorageResult<Vec<ImageRecord>> {
        let records = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, owner_id, display_name, storage_path,
                   size_bytes, description, created_at
            FROM images
            WHERE owner_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(page_size.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
