//! Static export parameters: center + dimensions or bounding box.

use std::sync::OnceLock;

use regex::Regex;

use super::tile::{clamp_scale, parse_zoom, STATIC_MAX_SCALE};
use super::{parse_degrees, RequestError, TileFormat, NUMBER};

/// Default ceiling on output pixels (`width × height × scale²`).
///
/// Equivalent to a 20000 × 20000 canvas.
pub const DEFAULT_PIXEL_LIMIT: u64 = 20_000 * 20_000;

/// Geographic extent of a static export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    /// Center point plus logical (scale 1) canvas dimensions.
    Center {
        lon: f64,
        lat: f64,
        width: u32,
        height: u32,
    },
    /// Bounding box in degrees; canvas size follows from the zoom.
    Bbox {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
}

/// A validated static export request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRequest {
    pub extent: Extent,
    pub zoom: u8,
    /// Scale multiplier, already clamped to [`STATIC_MAX_SCALE`].
    pub scale: u8,
    /// Output encoding, PNG or JPEG.
    pub format: TileFormat,
    /// Encoder quality (1-100), when given.
    pub quality: Option<u8>,
    /// Maximum output pixel count.
    pub limit: u64,
    /// Geographic part of the download filename, e.g. `-74.0_40.7_2`.
    pub locator: String,
    /// Extension as requested (`jpg` stays `jpg`), used in the filename.
    pub extension: String,
}

impl CompositeRequest {
    /// Builds a center request directly, for callers that do not go
    /// through path parsing.
    ///
    /// `scale` is clamped to `1..=STATIC_MAX_SCALE` like parsed paths.
    pub fn center(lon: f64, lat: f64, width: u32, height: u32, zoom: u8, scale: u8) -> Self {
        let scale = scale.clamp(1, STATIC_MAX_SCALE);
        Self {
            extent: Extent::Center {
                lon,
                lat,
                width,
                height,
            },
            zoom,
            scale,
            format: TileFormat::Png,
            quality: None,
            limit: DEFAULT_PIXEL_LIMIT,
            locator: format!("{}_{}_{}", lon, lat, scale),
            extension: TileFormat::Png.extension().to_string(),
        }
    }

    /// Builds a bounding box request directly.
    pub fn bbox(west: f64, south: f64, east: f64, north: f64, zoom: u8, scale: u8) -> Self {
        let scale = scale.clamp(1, STATIC_MAX_SCALE);
        Self {
            extent: Extent::Bbox {
                west,
                south,
                east,
                north,
            },
            zoom,
            scale,
            format: TileFormat::Png,
            quality: None,
            limit: DEFAULT_PIXEL_LIMIT,
            locator: format!("{}_{}_{}_{}_{}", west, south, east, north, scale),
            extension: TileFormat::Png.extension().to_string(),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self.extension = format.extension().to_string();
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

fn center_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^(\d+),({NUMBER}),({NUMBER})/(\d+)x(\d+)(?:@(\d+(?:\.\d*)?)x(\d*))?\.([A-Za-z0-9_.]+)$"
        ))
        .expect("center pattern is valid")
    })
}

fn bbox_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^(\d+)/({NUMBER}),({NUMBER}),({NUMBER}),({NUMBER})(?:@(\d+(?:\.\d*)?)x(\d*))?\.([A-Za-z0-9_.]+)$"
        ))
        .expect("bbox pattern is valid")
    })
}

/// Parses a static scale such as `2`, `2.0` or `12`.
///
/// Fractions are truncated and the result clamped to [`STATIC_MAX_SCALE`].
fn parse_static_scale(raw: Option<&str>) -> Result<u8, RequestError> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    let value: f64 = raw
        .parse()
        .map_err(|_| RequestError::invalid("scale", raw))?;
    if !value.is_finite() || value < 1.0 {
        return Err(RequestError::invalid("scale", raw));
    }
    clamp_scale(value.trunc() as u64, STATIC_MAX_SCALE)
}

fn parse_quality(raw: Option<&str>) -> Result<Option<u8>, RequestError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u8>()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .map(Some)
            .ok_or_else(|| RequestError::invalid("quality", raw)),
    }
}

fn parse_static_format(raw: &str) -> Result<TileFormat, RequestError> {
    match TileFormat::from_extension(raw)? {
        format @ (TileFormat::Png | TileFormat::Jpeg) => Ok(format),
        _ => Err(RequestError::UnsupportedFormat(raw.to_string())),
    }
}

fn parse_dimension(name: &'static str, raw: &str) -> Result<u32, RequestError> {
    raw.parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| RequestError::invalid(name, raw))
}

/// Parses `{z},{lon},{lat}/{w}x{h}[@{scale}x{quality}].{format}`.
///
/// # Example
///
/// ```
/// use tilestudio::request::{parse_center_path, Extent, DEFAULT_PIXEL_LIMIT};
///
/// let req = parse_center_path("4,10.5,20/300x200@2x80.jpeg", DEFAULT_PIXEL_LIMIT).unwrap();
/// assert_eq!(req.scale, 2);
/// assert_eq!(req.quality, Some(80));
/// assert!(matches!(req.extent, Extent::Center { width: 300, height: 200, .. }));
/// ```
pub fn parse_center_path(path: &str, limit: u64) -> Result<CompositeRequest, RequestError> {
    let path = path.trim_start_matches('/');
    let captures = center_pattern()
        .captures(path)
        .ok_or_else(|| RequestError::UnrecognizedPath(path.to_string()))?;

    let zoom = parse_zoom(&captures[1])?;
    let lon = parse_degrees("lon", &captures[2], 180.0)?;
    let lat = parse_degrees("lat", &captures[3], 90.0)?;
    let width = parse_dimension("width", &captures[4])?;
    let height = parse_dimension("height", &captures[5])?;
    let scale = parse_static_scale(captures.get(6).map(|m| m.as_str()))?;
    let quality = parse_quality(captures.get(7).map(|m| m.as_str()))?;
    let format = parse_static_format(&captures[8])?;

    Ok(CompositeRequest {
        extent: Extent::Center {
            lon,
            lat,
            width,
            height,
        },
        zoom,
        scale,
        format,
        quality,
        limit,
        locator: format!("{}_{}_{}", &captures[2], &captures[3], scale),
        extension: captures[8].to_string(),
    })
}

/// Parses `{z}/{west},{south},{east},{north}[@{scale}x{quality}].{format}`.
pub fn parse_bbox_path(path: &str, limit: u64) -> Result<CompositeRequest, RequestError> {
    let path = path.trim_start_matches('/');
    let captures = bbox_pattern()
        .captures(path)
        .ok_or_else(|| RequestError::UnrecognizedPath(path.to_string()))?;

    let zoom = parse_zoom(&captures[1])?;
    let west = parse_degrees("west", &captures[2], 180.0)?;
    let south = parse_degrees("south", &captures[3], 90.0)?;
    let east = parse_degrees("east", &captures[4], 180.0)?;
    let north = parse_degrees("north", &captures[5], 90.0)?;
    if west >= east {
        return Err(RequestError::invalid("east", &captures[4]));
    }
    if south >= north {
        return Err(RequestError::invalid("north", &captures[5]));
    }
    let scale = parse_static_scale(captures.get(6).map(|m| m.as_str()))?;
    let quality = parse_quality(captures.get(7).map(|m| m.as_str()))?;
    let format = parse_static_format(&captures[8])?;

    Ok(CompositeRequest {
        extent: Extent::Bbox {
            west,
            south,
            east,
            north,
        },
        zoom,
        scale,
        format,
        quality,
        limit,
        locator: format!(
            "{}_{}_{}_{}_{}",
            &captures[2], &captures[3], &captures[4], &captures[5], scale
        ),
        extension: captures[8].to_string(),
    })
}
