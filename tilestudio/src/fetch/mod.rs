//! Tile fetching with statistics, error ledger and response metadata.
//!
//! [`TileFetcher`] sits between a resolved request and the backend chosen by
//! [`TileHandle::select`]. It turns the backend's outcome into either a
//! [`TileReply`] (body, headers, cookies) or a [`FetchError`], and keeps the
//! per-style statistics and error ledger in step:
//!
//! | Outcome            | Stats    | Ledger          | Result                    |
//! |--------------------|----------|-----------------|---------------------------|
//! | tile               | recorded | cleared         | `Ok(TileReply)`           |
//! | `NotReady`         | -        | -               | `Err(FetchError::NotReady)` |
//! | `Failed(message)`  | -        | message appended | `Err(FetchError::Render)` |

mod grid;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{BackendError, Tile, TileHandle};
use crate::ledger::ErrorLedger;
use crate::request::{TileCoordinate, TileFormat};
use crate::stats::{Metric, StatsTracker};

/// Default `max-age` for tiles, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u64 = 3600;

/// Default `max-age` for UTFGrids, in seconds.
pub const DEFAULT_GRID_MAX_AGE: u64 = 86400;

/// Cookie carrying the pipe-joined error ledger.
pub const ERRORS_COOKIE: &str = "errors";

/// Caching policy applied to successful replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub cache_max_age: u64,
    pub grid_max_age: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            grid_max_age: DEFAULT_GRID_MAX_AGE,
        }
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Replace decoded vector JSON with a per-layer size summary.
    pub debug: bool,
}

/// A successful reply ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileReply {
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl TileReply {
    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Errors returned by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The backend is still loading; the client should retry.
    #[error("Tilesource not loaded")]
    NotReady,

    /// The backend failed. `errors` holds the encoded ledger, if one was
    /// updated.
    #[error("{message}")]
    Render {
        message: String,
        errors: Option<String>,
    },
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::NotReady => "ENOTREADY",
            FetchError::Render { .. } => "ERENDER",
        }
    }

    /// Encoded ledger to send in the `errors` cookie.
    pub fn errors_cookie(&self) -> Option<&str> {
        match self {
            FetchError::Render { errors, .. } => errors.as_deref(),
            FetchError::NotReady => None,
        }
    }
}

/// Fetches tiles through a handle and maintains stats and the ledger.
#[derive(Debug, Clone)]
pub struct TileFetcher {
    stats: Arc<StatsTracker>,
    ledger: Arc<ErrorLedger>,
    policy: FetchPolicy,
}

impl TileFetcher {
    pub fn new(stats: Arc<StatsTracker>, ledger: Arc<ErrorLedger>, policy: FetchPolicy) -> Self {
        Self {
            stats,
            ledger,
            policy,
        }
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn ledger(&self) -> &Arc<ErrorLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Fetches one tile and builds the reply.
    ///
    /// Grid coordinates are forwarded to [`TileFetcher::fetch_grid`].
    pub async fn fetch(
        &self,
        handle: &TileHandle,
        coord: TileCoordinate,
        options: FetchOptions,
    ) -> Result<TileReply, FetchError> {
        if coord.format() == TileFormat::Grid {
            return self.fetch_grid(handle, coord).await;
        }

        let backend = handle.select(coord.format());
        match backend.get_tile(coord).await {
            Ok(tile) => Ok(self.on_success(handle.id(), coord, tile, options)),
            Err(BackendError::NotReady) => {
                debug!(id = handle.id(), tile = %coord, "Tile source not ready");
                Err(FetchError::NotReady)
            }
            Err(BackendError::Failed(message)) => {
                warn!(id = handle.id(), tile = %coord, error = %message, "Tile render failed");
                let messages = self.ledger.record(handle.id(), message.clone());
                Err(FetchError::Render {
                    message,
                    errors: Some(ErrorLedger::encode(&messages)),
                })
            }
        }
    }

    fn on_success(
        &self,
        id: &str,
        coord: TileCoordinate,
        tile: Tile,
        options: FetchOptions,
    ) -> TileReply {
        let zoom = coord.z();
        let drawtime = self.record(id, Metric::DrawTime, zoom, tile.draw_time_ms);
        let srcbytes = self.record(id, Metric::SrcBytes, zoom, tile.src_bytes.map(|b| b as f64));
        self.ledger.clear(id);

        let mut headers = tile.headers;
        let mut body = tile.data;

        if coord.format() == TileFormat::Json && options.debug {
            match summarize_layers(&body) {
                Ok(summary) => {
                    body = Bytes::from(summary);
                    set_header(&mut headers, "content-type", "application/json");
                }
                Err(e) => warn!(id, tile = %coord, error = %e, "Cannot summarize vector layers"),
            }
        }

        set_header(
            &mut headers,
            "cache-control",
            &format!("max-age={}", self.policy.cache_max_age),
        );
        if coord.format().is_vector_payload() {
            set_header(&mut headers, "content-encoding", "deflate");
        }
        if !has_header(&headers, "content-type") {
            headers.push((
                "content-type".to_string(),
                coord.format().content_type().to_string(),
            ));
        }

        debug!(id, tile = %coord, bytes = body.len(), "Tile served");

        TileReply {
            body,
            headers,
            cookies: vec![
                (Metric::DrawTime.name().to_string(), drawtime),
                (Metric::SrcBytes.name().to_string(), srcbytes),
                (ERRORS_COOKIE.to_string(), String::new()),
            ],
        }
    }

    /// Records `value` if present and returns the metric's encoded snapshot.
    fn record(&self, id: &str, metric: Metric, zoom: u8, value: Option<f64>) -> String {
        let snapshot = match value {
            Some(value) => self.stats.record_and_snapshot(id, metric, zoom, value),
            None => self.stats.snapshot(id, metric),
        };
        StatsTracker::encode(&snapshot)
    }
}

/// Replaces decoded vector layers with `{layer: {features, jsonsize}}`.
fn summarize_layers(body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let layers: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    let mut summary = serde_json::Map::new();
    for layer in &layers {
        let name = layer
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let features = layer
            .get("features")
            .and_then(|f| f.as_array())
            .map_or(0, Vec::len);
        let jsonsize = serde_json::to_string(layer)?.len();
        summary.insert(
            name,
            serde_json::json!({ "features": features, "jsonsize": jsonsize }),
        );
    }
    serde_json::to_vec(&summary)
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Sets a header, replacing any existing value regardless of case.
pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}
