//! `tilestudio serve`: run the tile server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tilestudio::backend::{DebugBackend, MemoryCatalog, SourceHandle, StyleHandle};
use tilestudio::config::{config_file_path, ConfigFile};
use tilestudio::logging::{self, DEFAULT_LEVEL};
use tilestudio::server;
use tilestudio::service::TileService;
use tracing::{info, warn};

use crate::error::CliError;

/// Id under which the placeholder style is registered.
pub const DEBUG_STYLE_ID: &str = "tmstyle://debug";

/// Id under which the placeholder source is registered.
pub const DEBUG_SOURCE_ID: &str = "tmsource://debug";

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides [server] bind)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Configuration file (defaults to ~/.tilestudio/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds the placeholder style reports "not loaded" after startup
    #[arg(long, default_value_t = 0)]
    pub warmup: u64,

    /// Highest zoom the placeholder style renders; deeper tiles fail
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LEVEL)]
    pub log_level: String,
}

/// Run the server until Ctrl-C.
pub fn run(args: ServeArgs) -> Result<(), CliError> {
    let config_path = args.config.clone().unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&config_path)?;

    let _guard = logging::init_logging(
        &config.logging.directory,
        &config.logging.file,
        &args.log_level,
    )
    .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let bind = args.bind.unwrap_or(config.server.bind);
    info!(
        version = tilestudio::VERSION,
        config = %config_path.display(),
        "Starting tilestudio"
    );

    let catalog = debug_catalog(&args);
    info!(
        styles = catalog.style_count(),
        sources = catalog.source_count(),
        style = DEBUG_STYLE_ID,
        source = DEBUG_SOURCE_ID,
        "Registered placeholder backends"
    );
    let service = Arc::new(TileService::new(
        Arc::new(catalog),
        config.to_service_config(),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime
        .block_on(server::serve(service, bind, shutdown_signal()))
        .map_err(CliError::Serve)
}

/// Catalog with one placeholder style and its source.
fn debug_catalog(args: &ServeArgs) -> MemoryCatalog {
    let mut style_backend = DebugBackend::new("debug style");
    if args.warmup > 0 {
        style_backend = style_backend.with_warmup(Duration::from_secs(args.warmup));
    }
    if let Some(max_zoom) = args.max_zoom {
        style_backend = style_backend.with_max_zoom(max_zoom);
    }

    let source = Arc::new(SourceHandle::new(
        DEBUG_SOURCE_ID,
        Arc::new(DebugBackend::new("debug source")),
    ));
    let catalog = MemoryCatalog::new();
    catalog.insert_style(Arc::new(StyleHandle::new(
        DEBUG_STYLE_ID,
        "Debug",
        Arc::new(style_backend),
        source,
    )));
    catalog
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C; stopping"),
    }
}
