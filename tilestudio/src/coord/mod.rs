//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (longitude/latitude)
//! and Web Mercator world pixels at a given zoom level and tile size.
//!
//! The world at zoom `z` is a square of `2^z × tile_size` pixels. Pixel `x`
//! grows eastward from the antimeridian, pixel `y` grows southward from the
//! northern Mercator limit.

use std::f64::consts::PI;

/// Logical tile edge in pixels at scale 1.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted anywhere in the pipeline.
///
/// `2^30` still fits a `u32` tile index.
pub const MAX_ZOOM: u8 = 30;

/// Northern limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.051_128_779_806_59;

/// Southern limit of the Web Mercator projection.
pub const MIN_LAT: f64 = -MAX_LAT;

/// Half of the Web Mercator world width in metres.
const HALF_CIRCUMFERENCE_METRES: f64 = 20_037_508.34;

/// Number of tiles along one axis at the given zoom.
#[inline]
pub fn tile_count(zoom: u8) -> u64 {
    1u64 << zoom
}

/// World edge length in pixels at the given zoom and tile size.
#[inline]
pub fn world_size(zoom: u8, tile_size: u32) -> f64 {
    tile_count(zoom) as f64 * tile_size as f64
}

/// Converts longitude/latitude to world pixel coordinates.
///
/// Latitude is clamped to the Mercator limits so polar requests still land
/// on the first or last tile row.
///
/// # Arguments
///
/// * `lon` - Longitude in degrees
/// * `lat` - Latitude in degrees
/// * `zoom` - Zoom level
/// * `tile_size` - Tile edge in pixels (256 × scale)
#[inline]
pub fn lon_lat_to_world_px(lon: f64, lat: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let size = world_size(zoom, tile_size);
    let lat = lat.clamp(MIN_LAT, MAX_LAT);

    let x = (lon + 180.0) / 360.0 * size;

    let lat_rad = lat * PI / 180.0;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size;

    (x, y)
}

/// Converts world pixel coordinates back to longitude/latitude.
#[inline]
pub fn world_px_to_lon_lat(x: f64, y: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let size = world_size(zoom, tile_size);

    let lon = x / size * 360.0 - 180.0;

    let lat_rad = (PI * (1.0 - 2.0 * y / size)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lon, lat)
}

/// Wraps a (possibly negative or overflowing) tile column around the
/// antimeridian.
#[inline]
pub fn wrap_x(x: i64, zoom: u8) -> u32 {
    x.rem_euclid(tile_count(zoom) as i64) as u32
}

/// Whether a tile row lies inside the world at the given zoom.
#[inline]
pub fn contains_row(y: i64, zoom: u8) -> bool {
    y >= 0 && (y as u64) < tile_count(zoom)
}

/// Feature query tolerance in metres for a zoom level.
///
/// One thirty-second of the half circumference at zoom 0, halved per zoom.
#[inline]
pub fn inspect_tolerance(zoom: u8) -> u64 {
    (HALF_CIRCUMFERENCE_METRES / 32.0 / 2.0_f64.powi(zoom as i32)).round() as u64
}
