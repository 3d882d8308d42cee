//! Style and source handles, and backend selection.

use std::fmt;
use std::sync::Arc;

use super::TileBackend;
use crate::request::TileFormat;

/// Handle to a raw data source.
pub struct SourceHandle {
    id: String,
    backend: Arc<dyn TileBackend>,
}

impl SourceHandle {
    pub fn new(id: impl Into<String>, backend: Arc<dyn TileBackend>) -> Self {
        Self {
            id: id.into(),
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> &Arc<dyn TileBackend> {
        &self.backend
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle").field("id", &self.id).finish()
    }
}

/// Handle to a compiled style and the raw source it renders from.
pub struct StyleHandle {
    id: String,
    name: String,
    backend: Arc<dyn TileBackend>,
    source: Arc<SourceHandle>,
}

impl StyleHandle {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        backend: Arc<dyn TileBackend>,
        source: Arc<SourceHandle>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            backend,
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, used for static export filenames.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn TileBackend> {
        &self.backend
    }

    /// Underlying raw source used for vector passthrough.
    pub fn source(&self) -> &Arc<SourceHandle> {
        &self.source
    }
}

impl fmt::Debug for StyleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// The style or source a request was addressed to.
#[derive(Debug, Clone)]
pub enum TileHandle {
    Style(Arc<StyleHandle>),
    Source(Arc<SourceHandle>),
}

impl TileHandle {
    /// Identifier used to key statistics and the error ledger.
    pub fn id(&self) -> &str {
        match self {
            TileHandle::Style(style) => style.id(),
            TileHandle::Source(source) => source.id(),
        }
    }

    /// Display name. Sources are named by their id.
    pub fn name(&self) -> &str {
        match self {
            TileHandle::Style(style) => style.name(),
            TileHandle::Source(source) => source.id(),
        }
    }

    /// The handle's own backend, ignoring format.
    pub fn backend(&self) -> &Arc<dyn TileBackend> {
        match self {
            TileHandle::Style(style) => style.backend(),
            TileHandle::Source(source) => source.backend(),
        }
    }

    /// Chooses the backend that serves `format`.
    ///
    /// Vector payloads requested through a style skip rendering and come
    /// straight from the style's underlying source. Everything else is
    /// served by the handle's own backend.
    pub fn select(&self, format: TileFormat) -> &Arc<dyn TileBackend> {
        match self {
            TileHandle::Style(style) if format.is_vector_payload() => style.source().backend(),
            _ => self.backend(),
        }
    }
}
