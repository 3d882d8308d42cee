//! Placeholder backend that draws every tile itself.
//!
//! Each raster tile is a solid colour derived from its coordinate with a
//! dark one-pixel border, so stitched static exports show tile seams. The
//! vector payload is a small JSON document, zlib-deflated the way raw vector
//! tiles are stored. Used by the CLI when no renderer is attached, and in
//! tests.

use std::io::{Cursor, Write};
use std::time::{Duration, Instant};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use tracing::debug;

use super::{BackendError, BoxFuture, Feature, Tile, TileBackend};
use crate::coord::TILE_SIZE;
use crate::request::{TileCoordinate, TileFormat};

/// UTFGrid rows/columns for a 256px tile at resolution 4.
const GRID_SIZE: usize = 64;

/// Layer name used in vector payloads and feature queries.
const LAYER: &str = "debug";

/// Backend that renders coordinate-coloured placeholder tiles.
#[derive(Debug, Clone)]
pub struct DebugBackend {
    label: String,
    ready_at: Option<Instant>,
    max_zoom: Option<u8>,
}

impl DebugBackend {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ready_at: None,
            max_zoom: None,
        }
    }

    /// Reports `NotReady` until `warmup` has elapsed from now.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.ready_at = Some(Instant::now() + warmup);
        self
    }

    /// Fails every request above `max_zoom`.
    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = Some(max_zoom);
        self
    }

    fn check(&self, zoom: u8) -> Result<(), BackendError> {
        if let Some(ready_at) = self.ready_at {
            if Instant::now() < ready_at {
                return Err(BackendError::NotReady);
            }
        }
        if let Some(max_zoom) = self.max_zoom {
            if zoom > max_zoom {
                return Err(BackendError::Failed(format!(
                    "Zoom level {} exceeds maxzoom {} of {}",
                    zoom, max_zoom, self.label
                )));
            }
        }
        Ok(())
    }

    fn layers(&self, coord: &TileCoordinate) -> serde_json::Value {
        json!([{
            "name": LAYER,
            "features": [{
                "type": "Feature",
                "properties": {
                    "label": self.label,
                    "z": coord.z(),
                    "x": coord.x(),
                    "y": coord.y(),
                },
            }],
        }])
    }
}

/// Colour for a tile, stable per coordinate.
fn tile_colour(coord: &TileCoordinate) -> Rgba<u8> {
    let z = u32::from(coord.z());
    let r = (coord.x().wrapping_mul(67).wrapping_add(z * 31)) % 200 + 40;
    let g = (coord.y().wrapping_mul(41).wrapping_add(z * 17)) % 200 + 40;
    let b = (coord.x() ^ coord.y()).wrapping_mul(29) % 200 + 40;
    Rgba([r as u8, g as u8, b as u8, 255])
}

fn render_raster(coord: &TileCoordinate) -> Result<Vec<u8>, BackendError> {
    let size = TILE_SIZE * u32::from(coord.effective_scale());
    let fill = tile_colour(coord);
    let border = Rgba([fill[0] / 3, fill[1] / 3, fill[2] / 3, 255]);

    let image = RgbaImage::from_fn(size, size, |px, py| {
        if px == 0 || py == 0 || px == size - 1 || py == size - 1 {
            border
        } else {
            fill
        }
    });

    let (image, format) = match coord.format() {
        TileFormat::Jpeg => (
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
            ImageFormat::Jpeg,
        ),
        TileFormat::Webp => (DynamicImage::ImageRgba8(image), ImageFormat::WebP),
        _ => (DynamicImage::ImageRgba8(image), ImageFormat::Png),
    };

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .map_err(|e| BackendError::Failed(format!("Failed to encode tile: {}", e)))?;
    Ok(out.into_inner())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| BackendError::Failed(format!("Failed to deflate tile: {}", e)))
}

fn render(backend: &DebugBackend, coord: TileCoordinate) -> Result<Tile, BackendError> {
    let start = Instant::now();

    let (data, src_bytes) = match coord.format() {
        TileFormat::VectorPbf => {
            let raw = backend.layers(&coord).to_string().into_bytes();
            let len = raw.len() as u64;
            (deflate(&raw)?, len)
        }
        TileFormat::Json => {
            let raw = backend.layers(&coord).to_string().into_bytes();
            let len = raw.len() as u64;
            (raw, len)
        }
        _ => {
            let raw = backend.layers(&coord).to_string();
            (render_raster(&coord)?, raw.len() as u64)
        }
    };

    let draw_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    Ok(Tile::new(data)
        .with_header("content-type", coord.format().content_type())
        .with_draw_time(draw_time_ms.round())
        .with_src_bytes(src_bytes))
}

fn utf_grid(coord: &TileCoordinate) -> serde_json::Value {
    let row = "!".repeat(GRID_SIZE);
    let key = format!("{}/{}/{}", coord.z(), coord.x(), coord.y());
    let mut data = serde_json::Map::new();
    data.insert(key.clone(), json!({ "tile": key }));
    json!({
        "grid": vec![row; GRID_SIZE],
        "keys": ["", key],
        "data": data,
    })
}

impl TileBackend for DebugBackend {
    fn get_tile(&self, coord: TileCoordinate) -> BoxFuture<'_, Result<Tile, BackendError>> {
        Box::pin(async move {
            self.check(coord.z())?;
            debug!(label = %self.label, tile = %coord, "Rendering debug tile");

            let backend = self.clone();
            tokio::task::spawn_blocking(move || render(&backend, coord))
                .await
                .map_err(|e| BackendError::Failed(format!("Render task failed: {}", e)))?
        })
    }

    fn get_grid(
        &self,
        coord: TileCoordinate,
    ) -> BoxFuture<'_, Result<serde_json::Value, BackendError>> {
        Box::pin(async move {
            self.check(coord.z())?;
            Ok(utf_grid(&coord))
        })
    }

    fn query_features(
        &self,
        zoom: u8,
        lon: f64,
        lat: f64,
        _tolerance: u64,
    ) -> BoxFuture<'_, Result<Vec<Feature>, BackendError>> {
        Box::pin(async move {
            self.check(zoom)?;
            let mut properties = serde_json::Map::new();
            properties.insert("label".into(), json!(self.label));
            properties.insert("lon".into(), json!(lon));
            properties.insert("lat".into(), json!(lat));
            Ok(vec![Feature {
                layer: LAYER.to_string(),
                distance: Some(0.0),
                properties,
            }])
        })
    }
}
