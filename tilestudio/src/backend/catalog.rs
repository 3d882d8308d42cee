//! Lookup of style and source handles by id.

use std::sync::Arc;

use dashmap::DashMap;

use super::{SourceHandle, StyleHandle};

/// Resolves ids to loaded handles.
///
/// The loading and compiling of styles and sources lives behind this trait;
/// the serving pipeline only borrows what it returns.
pub trait Catalog: Send + Sync {
    fn style(&self, id: &str) -> Option<Arc<StyleHandle>>;
    fn source(&self, id: &str) -> Option<Arc<SourceHandle>>;
}

/// In-memory catalog of registered handles.
#[derive(Default)]
pub struct MemoryCatalog {
    styles: DashMap<String, Arc<StyleHandle>>,
    sources: DashMap<String, Arc<SourceHandle>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a style, and its source under the source's own id.
    pub fn insert_style(&self, style: Arc<StyleHandle>) {
        let source = Arc::clone(style.source());
        self.sources.insert(source.id().to_string(), source);
        self.styles.insert(style.id().to_string(), style);
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl Catalog for MemoryCatalog {
    fn style(&self, id: &str) -> Option<Arc<StyleHandle>> {
        self.styles.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn source(&self, id: &str) -> Option<Arc<SourceHandle>> {
        self.sources.get(id).map(|entry| Arc::clone(entry.value()))
    }
}
