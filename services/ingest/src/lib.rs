//! Pictor Ingest
//!
//! Accepts an image from an upload or a remote URL, stores the original,
//! derives the configured renditions concurrently and records metadata once
//! everything is on disk.
//!
//! # Architecture
//!
//! ```text
//! ImageSource -> OriginalStore -> DerivationEngine ─┬─ thumbnail ─┐
//!                                                   └─ preview  ──┴─> aggregate -> MetadataRepository
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/default.toml, config/{RUN_MODE}.toml)
//! 2. An optional explicit file
//! 3. Environment variables (prefixed with `PICTOR__`)
//!
//! See [`config`] for detailed configuration options.

pub mod aggregate;
pub mod config;
pub mod derive;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod source;

pub use aggregate::aggregate;
pub use config::{ConfigValidationError, FetchConfig, IngestConfig, LimitsConfig, LoggingConfig};
pub use derive::{
    default_renditions, DerivationEngine, RenditionOutput, RenditionSpec, ResizeMode,
    DEFAULT_MAX_PIXELS,
};
pub use error::IngestError;
pub use id::{generate_id, new_image_id};
pub use pipeline::ImagePipeline;
pub use source::{AcquiredSource, ImageSource, UploadSource, UrlSource};
