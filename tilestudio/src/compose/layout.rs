//! Canvas planning for static exports.
//!
//! Turns a [`CompositeRequest`] into the output canvas size, the world-pixel
//! origin of its top-left corner, and the set of tiles that cover it. Pure:
//! nothing here fetches.

use std::collections::HashMap;

use super::ComposeError;
use crate::coord::{self, TILE_SIZE};
use crate::request::{CompositeRequest, Extent, TileCoordinate, TileFormat};

/// One distinct tile and every canvas position it is drawn at.
///
/// A tile appears more than once when the canvas is wider than the world and
/// wrapped columns repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePlacement {
    pub coord: TileCoordinate,
    /// Top-left corners on the canvas, in output pixels.
    pub offsets: Vec<(i64, i64)>,
}

/// Output canvas and covering tiles for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayout {
    /// Output width in pixels (`logical width × scale`).
    pub width: u32,
    /// Output height in pixels (`logical height × scale`).
    pub height: u32,
    /// Tile edge in output pixels (`256 × scale`).
    pub tile_size: u32,
    /// World-pixel position of the canvas's top-left corner.
    pub origin: (i64, i64),
    /// Distinct tiles in row-major order of first appearance.
    pub tiles: Vec<TilePlacement>,
}

impl CanvasLayout {
    /// Plans the canvas for `request`.
    ///
    /// The pixel limit is checked before the tile set is computed, so an
    /// oversized request never reaches a backend.
    pub fn plan(request: &CompositeRequest) -> Result<Self, ComposeError> {
        let scale = request.scale.max(1);
        let zoom = request.zoom;
        let tile_size = TILE_SIZE * u32::from(scale);

        let (logical_w, logical_h, origin) = match request.extent {
            Extent::Center {
                lon,
                lat,
                width,
                height,
            } => {
                let (cx, cy) = coord::lon_lat_to_world_px(lon, lat, zoom, tile_size);
                let w = f64::from(width) * f64::from(scale);
                let h = f64::from(height) * f64::from(scale);
                let origin = ((cx - w / 2.0).floor() as i64, (cy - h / 2.0).floor() as i64);
                (u64::from(width), u64::from(height), origin)
            }
            Extent::Bbox {
                west,
                south,
                east,
                north,
            } => {
                // Logical size is measured at scale 1 so the output is exactly
                // `width × scale` by `height × scale`.
                let (x0, y0) = coord::lon_lat_to_world_px(west, north, zoom, TILE_SIZE);
                let (x1, y1) = coord::lon_lat_to_world_px(east, south, zoom, TILE_SIZE);
                let w = (x1 - x0).round().max(0.0) as u64;
                let h = (y1 - y0).round().max(0.0) as u64;
                let s = f64::from(scale);
                let origin = ((x0 * s).round() as i64, (y0 * s).round() as i64);
                (w, h, origin)
            }
        };

        let pixels = logical_w
            .saturating_mul(logical_h)
            .saturating_mul(u64::from(scale) * u64::from(scale));
        if pixels > request.limit {
            return Err(ComposeError::LimitExceeded {
                width: logical_w,
                height: logical_h,
                scale,
                limit: request.limit,
            });
        }
        if logical_w == 0 || logical_h == 0 {
            return Err(ComposeError::EmptyExtent);
        }

        // A custom limit above u32::MAX² could still let one side overflow.
        let width = u32::try_from(logical_w * u64::from(scale)).map_err(|_| {
            ComposeError::LimitExceeded {
                width: logical_w,
                height: logical_h,
                scale,
                limit: request.limit,
            }
        })?;
        let height = u32::try_from(logical_h * u64::from(scale)).map_err(|_| {
            ComposeError::LimitExceeded {
                width: logical_w,
                height: logical_h,
                scale,
                limit: request.limit,
            }
        })?;

        let tiles = covering_tiles(origin, width, height, tile_size, zoom, scale)?;

        Ok(Self {
            width,
            height,
            tile_size,
            origin,
            tiles,
        })
    }

    /// Number of tile fetches the export needs.
    pub fn fetch_count(&self) -> usize {
        self.tiles.len()
    }
}

fn covering_tiles(
    origin: (i64, i64),
    width: u32,
    height: u32,
    tile_size: u32,
    zoom: u8,
    scale: u8,
) -> Result<Vec<TilePlacement>, ComposeError> {
    let t = i64::from(tile_size);
    let (x0, y0) = origin;
    let first_col = x0.div_euclid(t);
    let last_col = (x0 + i64::from(width) - 1).div_euclid(t);
    let first_row = y0.div_euclid(t);
    let last_row = (y0 + i64::from(height) - 1).div_euclid(t);

    let mut tiles: Vec<TilePlacement> = Vec::new();
    let mut index: HashMap<(u32, u32), usize> = HashMap::new();

    for row in first_row..=last_row {
        // Rows beyond the poles stay transparent.
        if !coord::contains_row(row, zoom) {
            continue;
        }
        for col in first_col..=last_col {
            let x = coord::wrap_x(col, zoom);
            let y = row as u32;
            let offset = (col * t - x0, row * t - y0);

            match index.get(&(x, y)) {
                Some(&i) => tiles[i].offsets.push(offset),
                None => {
                    let coord = TileCoordinate::new(zoom, x, y)?
                        .with_scale(scale)
                        .with_format(TileFormat::Png);
                    index.insert((x, y), tiles.len());
                    tiles.push(TilePlacement {
                        coord,
                        offsets: vec![offset],
                    });
                }
            }
        }
    }

    Ok(tiles)
}
