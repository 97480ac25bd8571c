//! Rendition derivation.
//!
//! The stored original is decoded once, then every configured rendition is
//! resized, encoded in the original's format and written to
//! `{originals_root}/{rendition}/{storage_path}` on its own blocking worker.
//! All workers read the same immutable decoded image.

use crate::aggregate::aggregate;
use crate::error::IngestError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use pictor_storage::{ImageKind, StorageLayout};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

const FILTER: FilterType = FilterType::Lanczos3;

/// Default ceiling on the pixels any single rendition may allocate.
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// How a rendition's target box is applied to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Cover `width`x`height` and centre-crop to exactly that size
    Fill,
    /// Exactly `width` wide, height keeps the source aspect ratio
    FitWidth,
    /// Largest size inside `width`x`height` keeping the aspect ratio
    Fit,
}

/// One derived size of an image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenditionSpec {
    /// Rendition name; also its subdirectory and public path segment
    pub name: String,
    pub mode: ResizeMode,
    pub width: u32,
    /// Box height for `fill` and `fit`; defaults to `width`
    #[serde(default)]
    pub height: Option<u32>,
}

impl RenditionSpec {
    /// 400x400 centre-cropped square.
    pub fn thumbnail() -> Self {
        Self {
            name: "thumbnail".to_string(),
            mode: ResizeMode::Fill,
            width: 400,
            height: Some(400),
        }
    }

    /// 800 wide, proportional height.
    pub fn preview() -> Self {
        Self {
            name: "preview".to_string(),
            mode: ResizeMode::FitWidth,
            width: 800,
            height: None,
        }
    }

    fn box_height(&self) -> u32 {
        self.height.unwrap_or(self.width)
    }

    /// Output dimensions for a source of `src_width`x`src_height`.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let src_width = src_width.max(1);
        let src_height = src_height.max(1);

        match self.mode {
            ResizeMode::Fill => (self.width, self.box_height()),
            ResizeMode::FitWidth => (
                self.width,
                proportional_height(self.width, src_width, src_height),
            ),
            ResizeMode::Fit => {
                let scale = f64::min(
                    self.width as f64 / src_width as f64,
                    self.box_height() as f64 / src_height as f64,
                );
                (
                    ((src_width as f64 * scale).round() as u32).max(1),
                    ((src_height as f64 * scale).round() as u32).max(1),
                )
            }
        }
    }

    /// Largest pixel buffer [`render`](Self::render) allocates for this
    /// source, counting the scale-to-cover step of `fill`.
    pub fn working_pixels(&self, src_width: u32, src_height: u32) -> u64 {
        let (width, height) = self.target_dimensions(src_width, src_height);
        let target = u64::from(width) * u64::from(height);
        match self.mode {
            ResizeMode::Fill => {
                let (cover_width, cover_height) =
                    cover_dimensions(src_width, src_height, width, height);
                target.max(cover_width * cover_height)
            }
            ResizeMode::FitWidth | ResizeMode::Fit => target,
        }
    }

    /// Resize `source` according to this spec.
    pub fn render(&self, source: &DynamicImage) -> DynamicImage {
        let (width, height) = self.target_dimensions(source.width(), source.height());
        match self.mode {
            ResizeMode::Fill => source.resize_to_fill(width, height, FILTER),
            ResizeMode::FitWidth | ResizeMode::Fit => source.resize_exact(width, height, FILTER),
        }
    }
}

/// The thumbnail and preview renditions.
pub fn default_renditions() -> Vec<RenditionSpec> {
    vec![RenditionSpec::thumbnail(), RenditionSpec::preview()]
}

/// `round(target_width * src_height / src_width)`, at least 1.
pub fn proportional_height(target_width: u32, src_width: u32, src_height: u32) -> u32 {
    let ratio = src_height as f64 / src_width.max(1) as f64;
    ((target_width as f64 * ratio).round() as u32).max(1)
}

/// Size of the source scaled to cover `width`x`height`.
fn cover_dimensions(src_width: u32, src_height: u32, width: u32, height: u32) -> (u64, u64) {
    let (sw, sh) = (u64::from(src_width.max(1)), u64::from(src_height.max(1)));
    let (w, h) = (u64::from(width), u64::from(height));
    if w * sh >= h * sw {
        (w, (sh * w).div_ceil(sw))
    } else {
        ((sw * h).div_ceil(sh), h)
    }
}

/// Encoder format for a stored kind.
pub fn image_format(kind: ImageKind) -> ImageFormat {
    match kind {
        ImageKind::Png => ImageFormat::Png,
        ImageKind::Jpeg => ImageFormat::Jpeg,
        ImageKind::Gif => ImageFormat::Gif,
    }
}

/// A rendition written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionOutput {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes_written: u64,
}

/// Produces every configured rendition of a stored original.
#[derive(Debug, Clone)]
pub struct DerivationEngine {
    layout: StorageLayout,
    renditions: Arc<[RenditionSpec]>,
    max_pixels: u64,
}

impl DerivationEngine {
    pub fn new(layout: StorageLayout, renditions: Vec<RenditionSpec>) -> Self {
        Self {
            layout,
            renditions: renditions.into(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Reject sources whose decoded size or any rendition buffer exceeds
    /// `max_pixels`.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn renditions(&self) -> &[RenditionSpec] {
        &self.renditions
    }

    /// Decode `original` and write all renditions for `storage_path`.
    ///
    /// Decode failure, or a source too large to render within the pixel
    /// limit, returns before any rendition task is spawned. Otherwise
    /// one task per rendition runs to completion and the aggregated result is
    /// returned; see [`aggregate`].
    #[instrument(skip(self, original), fields(storage_path = %storage_path))]
    pub async fn derive(
        &self,
        original: &Path,
        storage_path: &str,
        kind: ImageKind,
    ) -> Result<Vec<RenditionOutput>, IngestError> {
        let source = Arc::new(decode(original.to_path_buf()).await?);
        let format = image_format(kind);
        self.check_size(source.width(), source.height())?;

        debug!(
            width = source.width(),
            height = source.height(),
            renditions = self.renditions.len(),
            "Original decoded"
        );

        let tasks = self
            .renditions
            .iter()
            .map(|spec| {
                let name = spec.name.clone();
                let spec = spec.clone();
                let source = Arc::clone(&source);
                let destination = self.layout.rendition_path(&spec.name, storage_path);
                let handle = tokio::task::spawn_blocking(move || {
                    write_rendition(&spec, &source, format, &destination)
                });
                (name, handle)
            })
            .collect();

        let outputs = aggregate(tasks).await?;
        metrics::counter!("ingest.renditions.written").increment(outputs.len() as u64);
        Ok(outputs)
    }
}

impl DerivationEngine {
    fn check_size(&self, width: u32, height: u32) -> Result<(), IngestError> {
        let source_pixels = u64::from(width) * u64::from(height);
        let oversized = source_pixels > self.max_pixels
            || self
                .renditions
                .iter()
                .any(|spec| spec.working_pixels(width, height) > self.max_pixels);

        if oversized {
            return Err(IngestError::ImageTooLarge {
                width,
                height,
                limit: self.max_pixels,
            });
        }
        Ok(())
    }
}

async fn decode(path: PathBuf) -> Result<DynamicImage, IngestError> {
    let decoded = tokio::task::spawn_blocking(move || -> image::ImageResult<DynamicImage> {
        ImageReader::open(&path)?.with_guessed_format()?.decode()
    })
    .await
    .map_err(|e| IngestError::RenditionTaskFailed {
        rendition: "original".to_string(),
        reason: e.to_string(),
    })?;

    decoded.map_err(IngestError::DecodeFailed)
}

fn write_rendition(
    spec: &RenditionSpec,
    source: &DynamicImage,
    format: ImageFormat,
    destination: &Path,
) -> Result<RenditionOutput, IngestError> {
    let rendered = spec.render(source);
    let rendered = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(rendered.to_rgb8()),
        ImageFormat::Gif => DynamicImage::ImageRgba8(rendered.to_rgba8()),
        _ => rendered,
    };

    let mut encoded = Vec::new();
    rendered
        .write_to(&mut Cursor::new(&mut encoded), format)
        .map_err(|source| IngestError::EncodeFailed {
            rendition: spec.name.clone(),
            source,
        })?;

    std::fs::write(destination, &encoded).map_err(|source| IngestError::RenditionWriteFailed {
        rendition: spec.name.clone(),
        source,
    })?;

    debug!(
        rendition = %spec.name,
        path = %destination.display(),
        width = rendered.width(),
        height = rendered.height(),
        bytes_written = encoded.len(),
        "Rendition written"
    );

    Ok(RenditionOutput {
        name: spec.name.clone(),
        path: destination.to_path_buf(),
        width: rendered.width(),
        height: rendered.height(),
        bytes_written: encoded.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn small_renditions() -> Vec<RenditionSpec> {
        vec![
            RenditionSpec {
                name: "thumbnail".to_string(),
                mode: ResizeMode::Fill,
                width: 16,
                height: Some(16),
            },
            RenditionSpec {
                name: "preview".to_string(),
                mode: ResizeMode::FitWidth,
                width: 32,
                height: None,
            },
        ]
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    async fn engine(root: &Path) -> DerivationEngine {
        let renditions = small_renditions();
        let layout = StorageLayout::new(root, renditions.iter().map(|r| r.name.clone()));
        layout.ensure_dirs().await.unwrap();
        DerivationEngine::new(layout, renditions)
    }

    #[test]
    fn test_proportional_height() {
        assert_eq!(proportional_height(800, 1600, 800), 400);
        assert_eq!(proportional_height(800, 1024, 768), 600);
        assert_eq!(proportional_height(800, 3, 2), 533);
        assert_eq!(proportional_height(800, 10_000, 1), 1);
    }

    #[test]
    fn test_aspect_ratio_law() {
        let preview = RenditionSpec::preview();
        for (w, h) in [(1600, 800), (640, 480), (333, 1000), (1, 1), (7919, 104_729)] {
            let (tw, th) = preview.target_dimensions(w, h);
            let expected = 800.0 * h as f64 / w as f64;
            assert_eq!(tw, 800);
            assert!((th as f64 - expected).abs() <= 1.0, "{}x{} -> {}", w, h, th);
        }
    }

    #[test]
    fn test_fill_and_fit_dimensions() {
        assert_eq!(RenditionSpec::thumbnail().target_dimensions(1600, 800), (400, 400));

        let fit = RenditionSpec {
            name: "box".to_string(),
            mode: ResizeMode::Fit,
            width: 300,
            height: Some(300),
        };
        assert_eq!(fit.target_dimensions(1200, 600), (300, 150));
        assert_eq!(fit.target_dimensions(600, 1200), (150, 300));
    }

    #[test]
    fn test_working_pixels_for_tall_source() {
        assert_eq!(RenditionSpec::preview().working_pixels(1, 20_000), 800 * 16_000_000);
        assert_eq!(RenditionSpec::thumbnail().working_pixels(1, 20_000), 400 * 8_000_000);
        assert_eq!(RenditionSpec::thumbnail().working_pixels(1600, 800), 800 * 400);
        assert_eq!(RenditionSpec::preview().working_pixels(1600, 800), 800 * 400);
    }

    #[test]
    fn test_render_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(50, 30, |x, y| {
            Rgb([(x * 5) as u8, (y * 8) as u8, 17])
        }));
        let spec = RenditionSpec::thumbnail();
        assert_eq!(spec.render(&img).as_bytes(), spec.render(&img).as_bytes());
    }

    #[tokio::test]
    async fn test_derive_writes_every_rendition() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let original = dir.path().join("img_derive0001.png");
        write_png(&original, 64, 48);

        let outputs = engine
            .derive(&original, "img_derive0001.png", ImageKind::Png)
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        let thumb = image::open(dir.path().join("thumbnail/img_derive0001.png")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (16, 16));
        let preview = image::open(dir.path().join("preview/img_derive0001.png")).unwrap();
        assert_eq!((preview.width(), preview.height()), (32, 24));
    }

    #[tokio::test]
    async fn test_undecodable_original_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let original = dir.path().join("img_garbage001.png");
        std::fs::write(&original, b"definitely not an image").unwrap();

        let err = engine
            .derive(&original, "img_garbage001.png", ImageKind::Png)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::DecodeFailed(_)));
        assert!(!dir.path().join("thumbnail/img_garbage001.png").exists());
        assert!(!dir.path().join("preview/img_garbage001.png").exists());
    }

    #[tokio::test]
    async fn test_sliver_source_rejected_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await.with_max_pixels(1_000_000);
        let original = dir.path().join("img_sliver0001.png");
        write_png(&original, 1, 20_000);

        let err = engine
            .derive(&original, "img_sliver0001.png", ImageKind::Png)
            .await
            .unwrap_err();

        match err {
            IngestError::ImageTooLarge { width, height, limit } => {
                assert_eq!((width, height), (1, 20_000));
                assert_eq!(limit, 1_000_000);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dir.path().join("thumbnail/img_sliver0001.png").exists());
        assert!(!dir.path().join("preview/img_sliver0001.png").exists());
    }

    #[tokio::test]
    async fn test_failed_preview_leaves_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;
        let original = dir.path().join("img_partial01.png");
        write_png(&original, 40, 20);

        std::fs::remove_dir(dir.path().join("preview")).unwrap();
        std::fs::write(dir.path().join("preview"), b"blocks the preview directory").unwrap();

        let err = engine
            .derive(&original, "img_partial01.png", ImageKind::Png)
            .await
            .unwrap_err();

        match err {
            IngestError::RenditionWriteFailed { rendition, .. } => assert_eq!(rendition, "preview"),
            other => panic!("unexpected error: {:?}", other),
        }
        let thumb = dir.path().join("thumbnail/img_partial01.png");
        assert!(std::fs::metadata(thumb).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_jpeg_and_gif_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path()).await;

        let jpeg = dir.path().join("img_jpegenc01.jpg");
        RgbImage::from_pixel(40, 20, Rgb([200, 10, 10]))
            .save_with_format(&jpeg, ImageFormat::Jpeg)
            .unwrap();
        engine
            .derive(&jpeg, "img_jpegenc01.jpg", ImageKind::Jpeg)
            .await
            .unwrap();
        let preview = image::open(dir.path().join("preview/img_jpegenc01.jpg")).unwrap();
        assert_eq!((preview.width(), preview.height()), (32, 16));

        let gif = dir.path().join("img_gifenc001.gif");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([0, 0, 255])))
            .to_rgba8()
            .save_with_format(&gif, ImageFormat::Gif)
            .unwrap();
        engine
            .derive(&gif, "img_gifenc001.gif", ImageKind::Gif)
            .await
            .unwrap();
        assert!(dir.path().join("thumbnail/img_gifenc001.gif").exists());
    }
}
