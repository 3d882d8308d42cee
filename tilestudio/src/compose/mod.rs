//! Static map compositor.
//!
//! Stitches individually fetched tiles into one PNG or JPEG image for a
//! center+size or bounding-box export.
//!
//! # Process
//!
//! 1. [`CanvasLayout::plan`] checks the pixel limit, sizes the canvas and
//!    lists the covering tiles. Nothing is fetched if the limit is exceeded.
//! 2. Tiles are fetched concurrently, at most `workers` at a time. The first
//!    `NotReady` or failure aborts the whole export.
//! 3. Tiles are decoded and drawn onto the canvas, which is then encoded on
//!    the blocking pool.

mod layout;

pub use layout::{CanvasLayout, TilePlacement};

use std::future::Future;
use std::io::Cursor;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageFormat, ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{BackendError, Tile};
use crate::request::{CompositeRequest, RequestError, TileCoordinate, TileFormat};

/// Default number of concurrent tile fetches per export.
pub const DEFAULT_WORKERS: usize = 8;

/// Default JPEG quality when the request names none.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Errors produced while composing a static image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error(
        "Requested {width}x{height} image at scale {scale} exceeds the limit of {limit} pixels"
    )]
    LimitExceeded {
        width: u64,
        height: u64,
        scale: u8,
        limit: u64,
    },

    #[error("Requested extent is empty")]
    EmptyExtent,

    #[error("Static maps cannot be exported as {0}")]
    UnsupportedFormat(TileFormat),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Tilesource not loaded")]
    NotReady,

    #[error("{0}")]
    Render(String),

    #[error("Cannot decode tile {tile}: {reason}")]
    Decode { tile: String, reason: String },

    #[error("Cannot encode image: {0}")]
    Encode(String),
}

impl ComposeError {
    pub fn code(&self) -> &'static str {
        match self {
            ComposeError::LimitExceeded { .. } => "ELIMIT",
            ComposeError::EmptyExtent | ComposeError::UnsupportedFormat(_) => "EINVALID",
            ComposeError::Request(e) => e.code(),
            ComposeError::NotReady => "ENOTREADY",
            ComposeError::Render(_) | ComposeError::Decode { .. } => "ERENDER",
            ComposeError::Encode(_) => "EINTERNAL",
        }
    }
}

/// An encoded static map ready for download.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
    pub filename: String,
}

impl StaticImage {
    /// `content-type` and `content-disposition` headers.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), self.content_type.to_string()),
            (
                "content-disposition".to_string(),
                format!("attachment; filename={}", self.filename),
            ),
        ]
    }
}

/// Fetches, stitches and encodes static maps.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    workers: usize,
    jpeg_quality: u8,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_JPEG_QUALITY)
    }
}

impl Compositor {
    pub fn new(workers: usize, jpeg_quality: u8) -> Self {
        Self {
            workers: workers.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Composes the export described by `request`.
    ///
    /// `name` is the style name used in the download filename. `fetch`
    /// produces one tile; it is called once per distinct covering tile.
    pub async fn compose<F, Fut>(
        &self,
        request: &CompositeRequest,
        name: &str,
        fetch: F,
    ) -> Result<StaticImage, ComposeError>
    where
        F: Fn(TileCoordinate) -> Fut,
        Fut: Future<Output = Result<Tile, BackendError>>,
    {
        if !matches!(request.format, TileFormat::Png | TileFormat::Jpeg) {
            return Err(ComposeError::UnsupportedFormat(request.format));
        }

        let layout = CanvasLayout::plan(request)?;
        debug!(
            width = layout.width,
            height = layout.height,
            tiles = layout.fetch_count(),
            workers = self.workers,
            "Planned static map"
        );

        let tiles = self.fetch_all(&layout, &fetch).await?;

        let format = request.format;
        let quality = request.quality.unwrap_or(self.jpeg_quality);
        let (width, height) = (layout.width, layout.height);
        let data = tokio::task::spawn_blocking(move || {
            let canvas = assemble(&layout, &tiles)?;
            encode(canvas, format, quality)
        })
        .await
        .map_err(|e| ComposeError::Encode(format!("Compose task failed: {}", e)))??;

        let filename = format!(
            "{}-z{}_{}.{}",
            name,
            request.zoom,
            request.locator,
            request.extension
        );
        info!(file = %filename, width, height, bytes = data.len(), "Static map composed");

        Ok(StaticImage {
            data: Bytes::from(data),
            width,
            height,
            content_type: format.content_type(),
            filename,
        })
    }

    async fn fetch_all<F, Fut>(
        &self,
        layout: &CanvasLayout,
        fetch: &F,
    ) -> Result<Vec<Bytes>, ComposeError>
    where
        F: Fn(TileCoordinate) -> Fut,
        Fut: Future<Output = Result<Tile, BackendError>>,
    {
        let mut fetched: Vec<Option<Bytes>> = vec![None; layout.tiles.len()];

        let coords: Vec<(usize, TileCoordinate)> =
            layout.tiles.iter().map(|p| p.coord).enumerate().collect();

        let mut results = stream::iter(coords)
            .map(|(i, coord)| {
                let pending = fetch(coord);
                async move { (i, pending.await) }
            })
            .buffer_unordered(self.workers);

        while let Some((i, result)) = results.next().await {
            match result {
                Ok(tile) => fetched[i] = Some(tile.data),
                Err(BackendError::NotReady) => return Err(ComposeError::NotReady),
                Err(BackendError::Failed(message)) => return Err(ComposeError::Render(message)),
            }
        }

        Ok(fetched.into_iter().flatten().collect())
    }
}

/// Draws every fetched tile at each of its offsets.
fn assemble(layout: &CanvasLayout, tiles: &[Bytes]) -> Result<RgbaImage, ComposeError> {
    let mut canvas = RgbaImage::new(layout.width, layout.height);
    let size = layout.tile_size;

    for (placement, data) in layout.tiles.iter().zip(tiles) {
        let decode_err = |reason: String| ComposeError::Decode {
            tile: placement.coord.to_string(),
            reason,
        };
        let mut tile = ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?
            .decode()
            .map_err(|e| decode_err(e.to_string()))?
            .to_rgba8();

        if tile.width() != size || tile.height() != size {
            tile = imageops::resize(&tile, size, size, FilterType::Triangle);
        }

        for &(x, y) in &placement.offsets {
            imageops::overlay(&mut canvas, &tile, x, y);
        }
    }

    Ok(canvas)
}

fn encode(canvas: RgbaImage, format: TileFormat, quality: u8) -> Result<Vec<u8>, ComposeError> {
    let mut out = Cursor::new(Vec::new());
    let result = match format {
        TileFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
        }
        _ => canvas.write_to(&mut out, ImageFormat::Png),
    };
    result.map_err(|e| ComposeError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::Rgba;

    use super::*;
    use crate::backend::tests::MockBackend;
    use crate::backend::TileBackend;

    fn png_tile(size: u32, colour: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(size, size, Rgba(colour));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn red_backend(size: u32) -> Arc<MockBackend> {
        let tile = Tile::new(png_tile(size, [200, 0, 0, 255]));
        Arc::new(MockBackend::new(Ok(tile)))
    }

    #[tokio::test]
    async fn test_limit_rejected_before_any_fetch() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 0.0, 20_000, 20_000, 10, 1)
            .with_limit(20_000);

        let err = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap_err();

        assert!(matches!(err, ComposeError::LimitExceeded { .. }));
        assert_eq!(err.code(), "ELIMIT");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_center_png_dimensions_and_filename() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 0.0, 300, 200, 3, 1);

        let image = Compositor::default()
            .compose(&request, "Streets", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        let decoded = image::load_from_memory(&image.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 200));
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.filename, "Streets-z3_0_0_1.png");
        assert_eq!(image.headers()[1].1, "attachment; filename=Streets-z3_0_0_1.png");
        assert_eq!(decoded.to_rgba8().get_pixel(150, 100), &Rgba([200, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_bbox_output_is_width_times_scale() {
        let mock = red_backend(512);
        let base = CanvasLayout::plan(&CompositeRequest::bbox(-5.0, -5.0, 5.0, 5.0, 5, 1)).unwrap();
        let request = CompositeRequest::bbox(-5.0, -5.0, 5.0, 5.0, 5, 2);

        let image = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        assert_eq!(image.width, base.width * 2);
        assert_eq!(image.height, base.height * 2);
        let decoded = image::load_from_memory(&image.data).unwrap();
        assert_eq!(decoded.width(), image.width);
        assert!(mock.seen.lock().iter().all(|c| c.scale() == Some(2)));
    }

    #[tokio::test]
    async fn test_each_distinct_tile_fetched_once() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 0.0, 768, 256, 0, 1);

        Compositor::new(2, 80)
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_ready_aborts() {
        let mock = red_backend(256);
        mock.set(1, 1, 1, Err(BackendError::NotReady));
        let request = CompositeRequest::center(0.0, 0.0, 512, 512, 1, 1);

        let err = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap_err();
        assert_eq!(err, ComposeError::NotReady);
    }

    #[tokio::test]
    async fn test_render_failure_aborts() {
        let mock = red_backend(256);
        mock.set(1, 0, 0, Err(BackendError::Failed("bad style".into())));
        let request = CompositeRequest::center(0.0, 0.0, 512, 512, 1, 1);

        let err = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap_err();
        assert_eq!(err, ComposeError::Render("bad style".into()));
        assert_eq!(err.code(), "ERENDER");
    }

    #[tokio::test]
    async fn test_jpeg_output() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 0.0, 100, 100, 2, 1)
            .with_format(TileFormat::Jpeg)
            .with_quality(50);

        let image = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        assert_eq!(image.content_type, "image/jpeg");
        assert!(image.filename.ends_with(".jpeg"));
        assert_eq!(image::guess_format(&image.data).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_filename_keeps_requested_extension() {
        let mock = red_backend(256);
        let request = crate::request::parse_center_path("2,0,0/64x64.jpg", 1_000_000).unwrap();

        let image = Compositor::default()
            .compose(&request, "Debug", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        assert_eq!(image.filename, "Debug-z2_0_0_1.jpg");
        assert_eq!(image.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_rows_beyond_pole_are_transparent() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 85.0, 256, 512, 1, 1);

        let image = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap();

        let canvas = image::load_from_memory(&image.data).unwrap().to_rgba8();
        assert_eq!(canvas.get_pixel(10, 10)[3], 0);
        assert_eq!(canvas.get_pixel(10, 400)[3], 255);
    }

    #[tokio::test]
    async fn test_undecodable_tile() {
        let mock = Arc::new(MockBackend::ok(b"not an image"));
        let request = CompositeRequest::center(0.0, 0.0, 10, 10, 0, 1);

        let err = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_raster_output() {
        let mock = red_backend(256);
        let request = CompositeRequest::center(0.0, 0.0, 10, 10, 0, 1)
            .with_format(TileFormat::Webp);

        let err = Compositor::default()
            .compose(&request, "Style", |coord| mock.get_tile(coord))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
        assert_eq!(mock.calls(), 0);
    }
}
