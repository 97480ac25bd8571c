//! Error taxonomy for the ingest pipeline.

use pictor_storage::StorageError;
use thiserror::Error;

/// Errors that can occur while ingesting an image.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No image source provided")]
    NoSourceProvided,

    #[error("Invalid image URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connecting, requesting or reading the source body failed.
    #[error("Image source unreachable: {0}")]
    SourceUnreachable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Image source responded with status {status}")]
    SourceNotOk { status: u16 },

    #[error("Unrecognized content type: {0:?}")]
    UnrecognizedContentType(String),

    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    #[error("Failed to store original: {0}")]
    StorageWriteFailed(#[source] StorageError),

    #[error("Failed to decode image: {0}")]
    DecodeFailed(#[source] image::ImageError),

    #[error("Image {width}x{height} needs more than {limit} pixels to render")]
    ImageTooLarge { width: u32, height: u32, limit: u64 },

    #[error("Original of {bytes} bytes cannot be recorded")]
    OriginalTooLarge { bytes: u64 },

    #[error("Failed to encode {rendition} rendition: {source}")]
    EncodeFailed {
        rendition: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write {rendition} rendition: {source}")]
    RenditionWriteFailed {
        rendition: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{rendition} rendition task failed: {reason}")]
    RenditionTaskFailed { rendition: String, reason: String },

    #[error("Failed to persist image metadata: {0}")]
    PersistenceFailed(#[source] StorageError),

    #[error("Storage unavailable: {0}")]
    Storage(#[source] StorageError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl IngestError {
    /// Whether the submitter can fix this by changing their input.
    ///
    /// Everything else is an infrastructure fault and fatal to the request.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IngestError::NoSourceProvided
                | IngestError::InvalidUrl { .. }
                | IngestError::SourceNotOk { .. }
                | IngestError::UnrecognizedContentType(_)
                | IngestError::UnsupportedImageType(_)
                | IngestError::DecodeFailed(_)
                | IngestError::ImageTooLarge { .. }
        )
    }
}
