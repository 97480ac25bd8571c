//! Pictor Storage
//!
//! Durable storage for the Pictor image pipeline: the original-image writer,
//! the on-disk layout shared with rendition writers, and the metadata
//! repository that indexes finished images in PostgreSQL.
//!
//! ## Architecture
//!
//! ```text
//!  byte stream           {originals_root}/             PostgreSQL
//! ┌──────────────┐      ┌──────────────────┐         ┌──────────────┐
//! │ Original     │─────▶│ img_xxx.jpg      │         │ images       │
//! │ Store        │      │ thumbnail/       │         └──────────────┘
//! └──────────────┘      │ preview/         │                ▲
//!                       └──────────────────┘                │
//!                                                  ┌──────────────┐
//!                                                  │ Metadata     │
//!                                                  │ Repository   │
//!                                                  └──────────────┘
//! ```
//!
//! The repository is a trait so the pipeline can run against
//! [`PgMetadataStore`], [`InMemoryMetadataStore`], or a mock (`mock` feature).

pub mod config;
pub mod error;
pub mod layout;
pub mod media_type;
pub mod memory;
pub mod metadata_store;
pub mod original_store;
pub mod record;

pub use config::{DatabaseConfig, StorageConfig, DEFAULT_PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use layout::StorageLayout;
pub use media_type::ImageKind;
pub use memory::InMemoryMetadataStore;
pub use metadata_store::{MetadataRepository, PgMetadataStore};
#[cfg(any(test, feature = "mock"))]
pub use metadata_store::MockMetadataRepository;
pub use original_store::{OriginalStore, StoredOriginal};
pub use record::ImageRecord;
