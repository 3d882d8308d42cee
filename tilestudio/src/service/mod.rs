//! Process-wide tile service.
//!
//! [`TileService`] owns the shared statistics, error ledger, fetcher and
//! compositor, and resolves request ids through a [`Catalog`]. One instance
//! is created at startup and shared by `Arc` with every request handler.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::backend::{Catalog, TileHandle};
use crate::compose::{
    ComposeError, Compositor, StaticImage, DEFAULT_JPEG_QUALITY, DEFAULT_WORKERS,
};
use crate::fetch::{
    FetchError, FetchOptions, FetchPolicy, TileFetcher, TileReply, DEFAULT_CACHE_MAX_AGE,
    DEFAULT_GRID_MAX_AGE,
};
use crate::inspect;
use crate::ledger::{ErrorLedger, DEFAULT_LEDGER_CAPACITY};
use crate::request::{
    parse_bbox_path, parse_center_path, parse_data_path, DataPath, RequestError, TileFormat,
    DEFAULT_PIXEL_LIMIT,
};
use crate::stats::StatsTracker;

/// Tunables for the serving pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// `max-age` for tiles, in seconds.
    pub cache_max_age: u64,
    /// `max-age` for UTFGrids, in seconds.
    pub grid_max_age: u64,
    /// Maximum output pixels of a static export.
    pub pixel_limit: u64,
    /// Concurrent tile fetches per static export.
    pub workers: usize,
    /// JPEG quality for static exports that name none.
    pub jpeg_quality: u8,
    /// Error ledger entries kept per style.
    pub ledger_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            grid_max_age: DEFAULT_GRID_MAX_AGE,
            pixel_limit: DEFAULT_PIXEL_LIMIT,
            workers: DEFAULT_WORKERS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        }
    }
}

impl ServiceConfig {
    pub fn with_cache_max_age(mut self, secs: u64) -> Self {
        self.cache_max_age = secs;
        self
    }

    pub fn with_grid_max_age(mut self, secs: u64) -> Self {
        self.grid_max_age = secs;
        self
    }

    pub fn with_pixel_limit(mut self, limit: u64) -> Self {
        self.pixel_limit = limit;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }
}

/// Which kind of handle a route addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Style,
    Source,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Style => f.write_str("Style"),
            HandleKind::Source => f.write_str("Source"),
        }
    }
}

/// Errors surfaced to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("{kind} {id} not found")]
    NotFound { kind: HandleKind, id: String },

    #[error("Missing id parameter")]
    MissingId,
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Request(e) => e.code(),
            ServiceError::Fetch(e) => e.code(),
            ServiceError::Compose(e) => e.code(),
            ServiceError::NotFound { .. } => "ENOTFOUND",
            ServiceError::MissingId => "EINVALID",
        }
    }

    /// Whether the client should retry the identical request.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            ServiceError::Fetch(FetchError::NotReady)
                | ServiceError::Compose(ComposeError::NotReady)
        )
    }

    /// Encoded error ledger, when this failure updated it.
    pub fn errors_cookie(&self) -> Option<&str> {
        match self {
            ServiceError::Fetch(e) => e.errors_cookie(),
            _ => None,
        }
    }
}

/// Shared serving state.
pub struct TileService {
    catalog: Arc<dyn Catalog>,
    stats: Arc<StatsTracker>,
    ledger: Arc<ErrorLedger>,
    fetcher: TileFetcher,
    compositor: Compositor,
    config: ServiceConfig,
}

impl TileService {
    pub fn new(catalog: Arc<dyn Catalog>, config: ServiceConfig) -> Self {
        let stats = Arc::new(StatsTracker::new());
        let ledger = Arc::new(ErrorLedger::new(config.ledger_capacity));
        let fetcher = TileFetcher::new(
            Arc::clone(&stats),
            Arc::clone(&ledger),
            FetchPolicy {
                cache_max_age: config.cache_max_age,
                grid_max_age: config.grid_max_age,
            },
        );
        let compositor = Compositor::new(config.workers, config.jpeg_quality);

        Self {
            catalog,
            stats,
            ledger,
            fetcher,
            compositor,
            config,
        }
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    pub fn ledger(&self) -> &Arc<ErrorLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Looks up the style or source named by a request's `id`.
    pub fn resolve(&self, kind: HandleKind, id: Option<&str>) -> Result<TileHandle, ServiceError> {
        let id = id.filter(|id| !id.is_empty()).ok_or(ServiceError::MissingId)?;
        let handle = match kind {
            HandleKind::Style => self.catalog.style(id).map(TileHandle::Style),
            HandleKind::Source => self.catalog.source(id).map(TileHandle::Source),
        };
        handle.ok_or_else(|| ServiceError::NotFound {
            kind,
            id: id.to_string(),
        })
    }

    /// Serves a tile, grid or inspect path under a style or source.
    pub async fn data(
        &self,
        kind: HandleKind,
        id: Option<&str>,
        path: &str,
        options: FetchOptions,
    ) -> Result<TileReply, ServiceError> {
        let handle = self.resolve(kind, id)?;

        match parse_data_path(path)? {
            DataPath::Tile(coord) => Ok(self.fetcher.fetch(&handle, coord, options).await?),
            DataPath::Inspect(request) => {
                let features = inspect::inspect(&handle, request).await?;
                let body = serde_json::to_vec(&features).map_err(|e| FetchError::Render {
                    message: e.to_string(),
                    errors: None,
                })?;
                Ok(TileReply {
                    body: Bytes::from(body),
                    headers: vec![(
                        "content-type".to_string(),
                        TileFormat::Json.content_type().to_string(),
                    )],
                    cookies: Vec::new(),
                })
            }
        }
    }

    /// Composes a center or bounding-box static export for a style.
    pub async fn static_map(
        &self,
        id: Option<&str>,
        path: &str,
    ) -> Result<StaticImage, ServiceError> {
        let handle = self.resolve(HandleKind::Style, id)?;
        let path = path.trim_start_matches('/');

        let request = if is_center_path(path) {
            parse_center_path(path, self.config.pixel_limit)?
        } else {
            parse_bbox_path(path, self.config.pixel_limit)?
        };
        debug!(id = handle.id(), path, "Static map requested");

        let backend = Arc::clone(handle.select(TileFormat::Png));
        let image = self
            .compositor
            .compose(&request, handle.name(), |coord| backend.get_tile(coord))
            .await?;
        Ok(image)
    }
}

/// Center paths carry `z,lon,lat` in their first segment; bbox paths `z`.
fn is_center_path(path: &str) -> bool {
    path.split('/').next().is_some_and(|first| first.contains(','))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MockBackend;
    use crate::backend::{BackendError, MemoryCatalog, SourceHandle, StyleHandle};
    use crate::stats::Metric;

    fn service_with(style: Arc<MockBackend>, source: Arc<MockBackend>) -> TileService {
        let catalog = MemoryCatalog::new();
        let source = Arc::new(SourceHandle::new("tmsource://src", source));
        catalog.insert_style(Arc::new(StyleHandle::new(
            "tmstyle://style",
            "Style",
            style,
            source,
        )));
        TileService::new(Arc::new(catalog), ServiceConfig::default())
    }

    fn service() -> TileService {
        service_with(
            Arc::new(MockBackend::ok(b"raster")),
            Arc::new(MockBackend::ok(b"vector")),
        )
    }

    #[test]
    fn test_resolve_errors() {
        let service = service();

        assert_eq!(
            service.resolve(HandleKind::Style, None).unwrap_err(),
            ServiceError::MissingId
        );
        assert_eq!(
            service.resolve(HandleKind::Style, Some("")).unwrap_err(),
            ServiceError::MissingId
        );
        let err = service
            .resolve(HandleKind::Source, Some("tmsource://nope"))
            .unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
        assert_eq!(err.to_string(), "Source tmsource://nope not found");
    }

    #[test]
    fn test_resolve_style_and_its_source() {
        let service = service();
        assert!(service
            .resolve(HandleKind::Style, Some("tmstyle://style"))
            .is_ok());
        assert!(service
            .resolve(HandleKind::Source, Some("tmsource://src"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_data_dispatches_tiles_and_vector_passthrough() {
        let service = service();
        let id = Some("tmstyle://style");

        let png = service
            .data(HandleKind::Style, id, "/1/0/0.png", FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(png.body.as_ref(), b"raster");

        let pbf = service
            .data(HandleKind::Style, id, "/1/0/0.vector.pbf", FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(pbf.body.as_ref(), b"vector");
        assert_eq!(pbf.header("content-encoding"), Some("deflate"));
    }

    #[tokio::test]
    async fn test_data_inspect() {
        let service = service();
        let reply = service
            .data(
                HandleKind::Style,
                Some("tmstyle://style"),
                "/3,10.5,20.25.json",
                FetchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(reply.header("content-type"), Some("application/json"));
        assert_eq!(reply.body.as_ref(), b"{}");
    }

    #[tokio::test]
    async fn test_data_invalid_path() {
        let service = service();
        let err = service
            .data(
                HandleKind::Style,
                Some("tmstyle://style"),
                "/2/9/0.png",
                FetchOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
    }

    #[tokio::test]
    async fn test_not_ready_is_flagged() {
        let service = service_with(
            Arc::new(MockBackend::new(Err(BackendError::NotReady))),
            Arc::new(MockBackend::ok(b"")),
        );
        let err = service
            .data(
                HandleKind::Style,
                Some("tmstyle://style"),
                "/0/0/0.png",
                FetchOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_ready());
        assert!(service
            .stats()
            .snapshot("tmstyle://style", Metric::DrawTime)
            .is_empty());
    }

    #[tokio::test]
    async fn test_render_error_carries_cookie() {
        let service = service_with(
            Arc::new(MockBackend::new(Err(BackendError::Failed("oops".into())))),
            Arc::new(MockBackend::ok(b"")),
        );
        let err = service
            .data(
                HandleKind::Style,
                Some("tmstyle://style"),
                "/0/0/0.png",
                FetchOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.errors_cookie(), Some("oops"));
        assert_eq!(service.ledger().messages("tmstyle://style"), vec!["oops"]);
    }

    #[tokio::test]
    async fn test_static_limit_exceeded_before_fetch() {
        let style = Arc::new(MockBackend::ok(b"raster"));
        let catalog = MemoryCatalog::new();
        catalog.insert_style(Arc::new(StyleHandle::new(
            "tmstyle://style",
            "Style",
            style.clone(),
            Arc::new(SourceHandle::new("src", Arc::new(MockBackend::ok(b"")))),
        )));
        let service = TileService::new(
            Arc::new(catalog),
            ServiceConfig::default().with_pixel_limit(20_000),
        );

        let err = service
            .static_map(Some("tmstyle://style"), "/10,0,0/20000x20000@1x.png")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ELIMIT");
        assert_eq!(style.calls(), 0);
    }

    #[test]
    fn test_center_path_detection() {
        assert!(is_center_path("5,10.0,20.0/100x100.png"));
        assert!(!is_center_path("5/-10,-10,10,10.png"));
    }
}
