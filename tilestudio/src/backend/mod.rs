//! Tile backend abstraction.
//!
//! A backend is whatever can already produce a tile for `(z, x, y)`: a
//! compiled style's renderer or a raw vector source. Compiling styles and
//! opening sources happens elsewhere; this module only defines the seam the
//! serving pipeline calls through, plus the selector that decides which
//! backend answers a given format.
//!
//! # Outcomes
//!
//! Every call resolves to one of three outcomes:
//!
//! - `Ok(_)` - data is available
//! - `Err(BackendError::NotReady)` - the source is still loading; the client
//!   should retry the same request later
//! - `Err(BackendError::Failed(_))` - a hard rendering failure
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so handles can hold
//! `Arc<dyn TileBackend>` and switch implementations at runtime.

mod catalog;
mod debug;
mod handle;

pub use catalog::{Catalog, MemoryCatalog};
pub use debug::DebugBackend;
pub use handle::{SourceHandle, StyleHandle, TileHandle};

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::TileCoordinate;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend's data is still being loaded or indexed.
    #[error("Tilesource not loaded")]
    NotReady,

    /// Rendering or reading failed.
    #[error("{0}")]
    Failed(String),
}

/// Tile payload returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Encoded tile bytes (image, deflated vector payload or JSON).
    pub data: Bytes,
    /// Headers the backend wants forwarded (e.g. `content-type`).
    pub headers: Vec<(String, String)>,
    /// Time spent rendering, in milliseconds.
    pub draw_time_ms: Option<f64>,
    /// Bytes read from the underlying source.
    pub src_bytes: Option<u64>,
}

impl Tile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: Vec::new(),
            draw_time_ms: None,
            src_bytes: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_draw_time(mut self, ms: f64) -> Self {
        self.draw_time_ms = Some(ms);
        self
    }

    pub fn with_src_bytes(mut self, bytes: u64) -> Self {
        self.src_bytes = Some(bytes);
        self
    }
}

/// A feature returned by a point query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Layer the feature belongs to.
    pub layer: String,
    /// Distance from the query point in metres, if the backend computed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Feature attributes.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Capability to produce tiles, grids and feature queries.
///
/// Implementations must be thread-safe (`Send + Sync`): one backend serves
/// many concurrent requests and the static compositor fans out tile fetches
/// in parallel.
pub trait TileBackend: Send + Sync {
    /// Fetch a tile. The coordinate carries scale and format.
    fn get_tile(&self, coord: TileCoordinate) -> BoxFuture<'_, Result<Tile, BackendError>>;

    /// Fetch the UTFGrid for a tile.
    fn get_grid(
        &self,
        coord: TileCoordinate,
    ) -> BoxFuture<'_, Result<serde_json::Value, BackendError>>;

    /// Query features near a point.
    ///
    /// Backends without feature lookup return no features.
    fn query_features(
        &self,
        _zoom: u8,
        _lon: f64,
        _lat: f64,
        _tolerance: u64,
    ) -> BoxFuture<'_, Result<Vec<Feature>, BackendError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
