//! Tile coordinate parsing and scale clamping.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::{RequestError, TileFormat};
use crate::coord::{tile_count, MAX_ZOOM};

/// Highest scale multiplier served for individual tiles (1024px at 4x).
pub const TILE_MAX_SCALE: u8 = 4;

/// Highest scale multiplier served for static exports.
pub const STATIC_MAX_SCALE: u8 = 8;

/// A validated tile address with optional scale and an output format.
///
/// `x` and `y` are always inside the `2^z × 2^z` grid.
///
/// # Example
///
/// ```
/// use tilestudio::request::{parse_tile_path, TileFormat};
///
/// let coord = parse_tile_path("5/16/10@2x.png").unwrap();
/// assert_eq!((coord.z(), coord.x(), coord.y()), (5, 16, 10));
/// assert_eq!(coord.scale(), Some(2));
/// assert_eq!(coord.format(), TileFormat::Png);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    z: u8,
    x: u32,
    y: u32,
    scale: Option<u8>,
    format: TileFormat,
}

impl TileCoordinate {
    /// Creates a coordinate, checking zoom and grid bounds.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, RequestError> {
        if z > MAX_ZOOM {
            return Err(RequestError::invalid("z", z.to_string()));
        }
        let count = tile_count(z);
        if u64::from(x) >= count {
            return Err(RequestError::invalid("x", x.to_string()));
        }
        if u64::from(y) >= count {
            return Err(RequestError::invalid("y", y.to_string()));
        }
        Ok(Self {
            z,
            x,
            y,
            scale: None,
            format: TileFormat::default(),
        })
    }

    /// Returns a copy with the given scale multiplier.
    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Returns a copy with the given output format.
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Requested scale, if the path carried an `@Nx` suffix.
    pub fn scale(&self) -> Option<u8> {
        self.scale
    }

    /// Requested scale, or 1 when none was given.
    pub fn effective_scale(&self) -> u8 {
        self.scale.unwrap_or(1)
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)?;
        if let Some(scale) = self.scale {
            write!(f, "@{}x", scale)?;
        }
        write!(f, ".{}", self.format)
    }
}

/// Clamps a requested scale multiplier to `max`.
///
/// Values above the cap are silently reduced to it; zero is rejected.
pub fn clamp_scale(raw: u64, max: u8) -> Result<u8, RequestError> {
    if raw == 0 {
        return Err(RequestError::invalid("scale", "0"));
    }
    Ok(raw.min(u64::from(max)) as u8)
}

/// Tile path pattern.
///
/// - Group 1-3: z, x, y
/// - Group 4: optional scale digits from `@Nx`
/// - Group 5: optional extension (`png`, `vector.pbf`, `grid.json`, ...)
fn tile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)/(\d+)/(\d+)(?:@(\d+)x)?(?:\.([A-Za-z0-9_.]+))?$")
            .expect("tile pattern is valid")
    })
}

pub(crate) fn parse_zoom(raw: &str) -> Result<u8, RequestError> {
    raw.parse::<u8>()
        .ok()
        .filter(|z| *z <= MAX_ZOOM)
        .ok_or_else(|| RequestError::invalid("z", raw))
}

fn parse_index(name: &'static str, raw: &str) -> Result<u32, RequestError> {
    raw.parse::<u32>()
        .map_err(|_| RequestError::invalid(name, raw))
}

/// Parses `{z}/{x}/{y}[@{n}x][.{format}]` into a [`TileCoordinate`].
///
/// The format defaults to PNG when the extension is absent and the scale is
/// clamped to [`TILE_MAX_SCALE`].
pub fn parse_tile_path(path: &str) -> Result<TileCoordinate, RequestError> {
    let path = path.trim_start_matches('/');
    let captures = tile_pattern()
        .captures(path)
        .ok_or_else(|| RequestError::UnrecognizedPath(path.to_string()))?;

    let z = parse_zoom(&captures[1])?;
    let x = parse_index("x", &captures[2])?;
    let y = parse_index("y", &captures[3])?;

    let mut coord = TileCoordinate::new(z, x, y)?;

    if let Some(scale) = captures.get(4) {
        // Digits only; anything too long for u64 is above the cap anyway.
        let raw = scale.as_str().parse::<u64>().unwrap_or(u64::MAX);
        coord = coord.with_scale(clamp_scale(raw, TILE_MAX_SCALE)?);
    }

    if let Some(ext) = captures.get(5) {
        coord = coord.with_format(TileFormat::from_extension(ext.as_str())?);
    }

    Ok(coord)
}
