//! Image sources: caller-supplied uploads and remote URLs.
//!
//! Both produce a byte stream plus a validated [`ImageKind`]; the payload is
//! never buffered whole, it is streamed straight into the original store.

use crate::error::IngestError;
use async_trait::async_trait;
use futures::TryStreamExt;
use pictor_storage::ImageKind;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Boxed byte stream handed to the original store.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// An acquired, type-checked source.
pub struct AcquiredSource {
    /// Upload filename or URL basename
    pub display_name: String,
    pub kind: ImageKind,
    pub reader: ByteReader,
}

impl std::fmt::Debug for AcquiredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredSource")
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Anything that can produce image bytes for the pipeline.
#[async_trait]
pub trait ImageSource: Send {
    async fn acquire(self) -> Result<AcquiredSource, IngestError>;
}

/// A stream supplied by the caller, typed by its declared filename.
pub struct UploadSource {
    reader: Option<ByteReader>,
    filename: String,
}

impl UploadSource {
    pub fn new<R>(reader: Option<R>, filename: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: reader.map(|r| Box::pin(r) as ByteReader),
            filename: filename.into(),
        }
    }
}

#[async_trait]
impl ImageSource for UploadSource {
    async fn acquire(self) -> Result<AcquiredSource, IngestError> {
        let reader = self.reader.ok_or(IngestError::NoSourceProvided)?;
        let kind = ImageKind::from_filename(&self.filename)
            .ok_or_else(|| IngestError::UnsupportedImageType(self.filename.clone()))?;

        Ok(AcquiredSource {
            display_name: self.filename,
            kind,
            reader,
        })
    }
}

/// An image fetched with HTTP GET.
pub struct UrlSource {
    client: Client,
    url: String,
}

impl UrlSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ImageSource for UrlSource {
    async fn acquire(self) -> Result<AcquiredSource, IngestError> {
        let url = Url::parse(&self.url).map_err(|e| IngestError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        let display_name = url_basename(&url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::SourceUnreachable(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::SourceNotOk {
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();
        let essence = parse_media_type(&declared)
            .ok_or_else(|| IngestError::UnrecognizedContentType(declared.clone()))?;
        let kind = ImageKind::from_mime(&essence)
            .ok_or_else(|| IngestError::UnsupportedImageType(essence.clone()))?;

        debug!(
            url = %self.url,
            status = status.as_u16(),
            content_type = %essence,
            content_length = ?response.content_length(),
            "Remote image accepted"
        );

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(AcquiredSource {
            display_name,
            kind,
            reader: Box::pin(StreamReader::new(body)),
        })
    }
}

/// Last non-empty path segment, falling back to the host.
fn url_basename(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Extract the lowercase `type/subtype` essence of a `Content-Type` value.
///
/// Returns `None` when the value is not a well-formed media type.
pub fn parse_media_type(value: &str) -> Option<String> {
    let essence = value.split(';').next()?.trim();
    let (main, sub) = essence.split_once('/')?;
    if main.is_empty() || sub.is_empty() || !main.chars().all(is_token) || !sub.chars().all(is_token) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn is_token(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}
