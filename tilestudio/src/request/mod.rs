//! Request resolution: raw path segments to validated coordinates.
//!
//! Every inbound path is parsed here before any backend is touched, so a
//! malformed coordinate, scale or format fails fast with [`RequestError`].
//!
//! # Path shapes
//!
//! ```text
//! tiles      {z}/{x}/{y}[@{n}x][.{format}]        5/16/10@2x.png
//! grids      {z}/{x}/{y}.grid.json                5/16/10.grid.json
//! inspect    {z},{lon},{lat}.json                 12,-74.0,40.7.json
//! center     {z},{lon},{lat}/{w}x{h}[@{s}x{q}].{format}
//! bbox       {z}/{w},{s},{e},{n}[@{s}x{q}].{format}
//! ```

mod composite;
mod format;
mod tile;

pub use composite::{
    parse_bbox_path, parse_center_path, CompositeRequest, Extent, DEFAULT_PIXEL_LIMIT,
};
pub use format::TileFormat;
pub use tile::{
    clamp_scale, parse_tile_path, TileCoordinate, STATIC_MAX_SCALE, TILE_MAX_SCALE,
};

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Errors produced while resolving request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// A path or query value is malformed or out of range.
    #[error("Invalid parameter {name}: '{value}'")]
    InvalidParameter { name: &'static str, value: String },

    /// The requested format is unknown or not valid for this request kind.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The path does not match any known request shape.
    #[error("Unrecognized path: {0}")]
    UnrecognizedPath(String),
}

impl RequestError {
    pub(crate) fn invalid(name: &'static str, value: impl Into<String>) -> Self {
        RequestError::InvalidParameter {
            name,
            value: value.into(),
        }
    }

    /// Stable error code for client-facing error bodies.
    pub fn code(&self) -> &'static str {
        "EINVALID"
    }
}

/// Point query against a style or source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InspectRequest {
    pub zoom: u8,
    pub lon: f64,
    pub lat: f64,
}

/// Data request under a style or source prefix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataPath {
    /// Tile or grid at a coordinate.
    Tile(TileCoordinate),
    /// Feature inspection at a point.
    Inspect(InspectRequest),
}

/// Number pattern shared by geographic path segments.
pub(crate) const NUMBER: &str = r"[-+]?\d+(?:\.\d+)?";

fn inspect_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^(\d+),({NUMBER}),({NUMBER})\.json$"))
            .expect("inspect pattern is valid")
    })
}

/// Parses `{z},{lon},{lat}.json`.
pub fn parse_inspect_path(path: &str) -> Result<InspectRequest, RequestError> {
    let path = path.trim_start_matches('/');
    let captures = inspect_pattern()
        .captures(path)
        .ok_or_else(|| RequestError::UnrecognizedPath(path.to_string()))?;

    let zoom = tile::parse_zoom(&captures[1])?;
    let lon = parse_degrees("lon", &captures[2], 180.0)?;
    let lat = parse_degrees("lat", &captures[3], 90.0)?;

    Ok(InspectRequest { zoom, lon, lat })
}

/// Dispatches a data path to the tile/grid or inspect parser.
pub fn parse_data_path(path: &str) -> Result<DataPath, RequestError> {
    let trimmed = path.trim_start_matches('/');
    if inspect_pattern().is_match(trimmed) {
        return parse_inspect_path(trimmed).map(DataPath::Inspect);
    }
    parse_tile_path(trimmed).map(DataPath::Tile)
}

/// Parses a finite coordinate in degrees and checks `|value| <= limit`.
pub(crate) fn parse_degrees(
    name: &'static str,
    raw: &str,
    limit: f64,
) -> Result<f64, RequestError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| RequestError::invalid(name, raw))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(RequestError::invalid(name, raw));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_path() {
        let req = parse_inspect_path("12,-74.006,40.7128.json").unwrap();
        assert_eq!(req.zoom, 12);
        assert!((req.lon + 74.006).abs() < 1e-9);
        assert!((req.lat - 40.7128).abs() < 1e-9);
    }

    #[test]
    fn test_parse_inspect_rejects_out_of_range_latitude() {
        let err = parse_inspect_path("3,0,95.json").unwrap_err();
        assert_eq!(err, RequestError::invalid("lat", "95"));
    }

    #[test]
    fn test_parse_data_path_dispatch() {
        assert!(matches!(
            parse_data_path("/3,10,20.json").unwrap(),
            DataPath::Inspect(_)
        ));
        assert!(matches!(
            parse_data_path("3/1/2.png").unwrap(),
            DataPath::Tile(_)
        ));
        match parse_data_path("3/1/2.grid.json").unwrap() {
            DataPath::Tile(coord) => assert_eq!(coord.format(), TileFormat::Grid),
            other => panic!("expected grid tile, got {:?}", other),
        }
    }

    #[test]
    fn test_error_code_is_stable() {
        assert_eq!(RequestError::invalid("z", "abc").code(), "EINVALID");
        assert_eq!(
            RequestError::UnsupportedFormat("tiff".into()).code(),
            "EINVALID"
        );
    }

    #[test]
    fn test_error_display() {
        let err = RequestError::invalid("x", "99");
        assert_eq!(err.to_string(), "Invalid parameter x: '99'");
    }
}
