//! Tilestudio - tile and static map serving for styles and raw sources
//!
//! This library resolves tile requests, selects between a style's rendering
//! backend and its underlying raw source, tracks per-style rendering
//! statistics and errors, and stitches individually fetched tiles into
//! static map images.
//!
//! # Pipeline
//!
//! ```text
//! path ──► request ──► backend::TileHandle::select ──► fetch::TileFetcher ──► reply
//!                                                        │
//!                                                        ├─► stats::StatsTracker
//!                                                        └─► ledger::ErrorLedger
//!
//! static path ──► request ──► compose::Compositor ──► (N × backend fetch) ──► image
//! ```

pub mod backend;
pub mod compose;
pub mod config;
pub mod coord;
pub mod fetch;
pub mod inspect;
pub mod ledger;
pub mod logging;
pub mod request;
pub mod server;
pub mod service;
pub mod stats;

/// Crate version, reported by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
