//! Output format tags carried by tile and static requests.

use std::fmt;

use super::RequestError;

/// Payload format requested by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TileFormat {
    /// PNG raster image (the default).
    #[default]
    Png,
    /// JPEG raster image.
    Jpeg,
    /// WebP raster image.
    Webp,
    /// Raw vector tile payload, served deflated from the underlying source.
    VectorPbf,
    /// Vector layers decoded to JSON.
    Json,
    /// UTFGrid interaction grid.
    Grid,
}

impl TileFormat {
    /// Parses a path extension such as `png`, `vector.pbf` or `grid.json`.
    pub fn from_extension(ext: &str) -> Result<Self, RequestError> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            "webp" => Ok(TileFormat::Webp),
            "vector.pbf" => Ok(TileFormat::VectorPbf),
            "json" => Ok(TileFormat::Json),
            "grid.json" => Ok(TileFormat::Grid),
            _ => Err(RequestError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Canonical extension used in filenames.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpeg",
            TileFormat::Webp => "webp",
            TileFormat::VectorPbf => "vector.pbf",
            TileFormat::Json => "json",
            TileFormat::Grid => "grid.json",
        }
    }

    /// MIME type for the response body.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Webp => "image/webp",
            TileFormat::VectorPbf => "application/x-protobuf",
            TileFormat::Json | TileFormat::Grid => "application/json",
        }
    }

    /// Whether this format bypasses rendering and is served by the raw source.
    pub fn is_vector_payload(&self) -> bool {
        matches!(self, TileFormat::VectorPbf)
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
