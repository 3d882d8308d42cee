//! UTFGrid passthrough.
//!
//! Grids are served with their own, longer cache lifetime and never touch
//! statistics. A failing grid is reported without updating the error ledger.

use bytes::Bytes;
use tracing::{debug, warn};

use super::{set_header, FetchError, TileFetcher, TileReply};
use crate::backend::{BackendError, TileHandle};
use crate::request::{TileCoordinate, TileFormat};

impl TileFetcher {
    /// Fetches the UTFGrid for `coord` from the handle's own backend.
    pub async fn fetch_grid(
        &self,
        handle: &TileHandle,
        coord: TileCoordinate,
    ) -> Result<TileReply, FetchError> {
        let coord = coord.with_format(TileFormat::Grid);
        let grid = match handle.select(TileFormat::Grid).get_grid(coord).await {
            Ok(grid) => grid,
            Err(BackendError::NotReady) => {
                debug!(id = handle.id(), tile = %coord, "Grid source not ready");
                return Err(FetchError::NotReady);
            }
            Err(BackendError::Failed(message)) => {
                warn!(id = handle.id(), tile = %coord, error = %message, "Grid render failed");
                return Err(FetchError::Render {
                    message,
                    errors: None,
                });
            }
        };

        let body = serde_json::to_vec(&grid).map_err(|e| FetchError::Render {
            message: format!("Cannot encode grid: {}", e),
            errors: None,
        })?;

        let mut headers = Vec::new();
        set_header(
            &mut headers,
            "cache-control",
            &format!("max-age={}", self.policy.grid_max_age),
        );
        set_header(&mut headers, "content-type", TileFormat::Grid.content_type());

        Ok(TileReply {
            body: Bytes::from(body),
            headers,
            cookies: Vec::new(),
        })
    }
}
