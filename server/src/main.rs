//! CropScan Prediction Server
//!
//! HTTP API serving one disease classifier per crop. All models are loaded
//! before the listener binds; crops that fail to load are left out and the
//! server refuses to start when none load.

mod error;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cropscan::backend::backend_name;
use cropscan::utils::logging::{init_logging, LogConfig, LogLevel};
use cropscan::{load_builtin_models, CropCatalog};
use tracing::{error, info};

use crate::state::{AppState, ServerConfig};

/// CropScan Prediction Server
#[derive(Parser, Debug)]
#[command(name = "cropscan-server")]
#[command(version)]
#[command(about = "HTTP API server for crop disease prediction")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "5001")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory with weight files (.mpk) and descriptors (.arch.json)
    #[arg(long, env = "CROPSCAN_MODELS_DIR", default_value = cropscan::DEFAULT_MODELS_DIR)]
    models_dir: PathBuf,

    /// JSON crop catalog replacing the built-in crops
    #[arg(long, env = "CROPSCAN_CATALOG")]
    catalog: Option<PathBuf>,

    /// Allowed CORS origin (any origin when unset)
    #[arg(long, env = "CROPSCAN_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Maximum request body size in MiB
    #[arg(long, default_value = "16")]
    body_limit_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Verbose logging (debug level with targets and thread ids)
    #[arg(short, long)]
    verbose: bool,

    /// Plain log output without ANSI colors
    #[arg(long, env = "CROPSCAN_NO_ANSI")]
    no_ansi: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.no_ansi {
        LogConfig::production().with_level(LogLevel::parse(&cli.log_level))
    } else {
        LogConfig::default().with_level(LogLevel::parse(&cli.log_level))
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    // Build configuration
    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        models_dir: cli.models_dir,
        catalog: cli.catalog,
        cors_origin: cli.cors_origin,
        body_limit_mb: cli.body_limit_mb,
    };

    info!("CropScan Prediction Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Models dir:  {:?}", config.models_dir);
    info!("  Catalog:     {:?}", config.catalog);
    info!("  CORS origin: {}", config.cors_origin.as_deref().unwrap_or("*"));
    info!("  Body limit:  {} MiB", config.body_limit_mb);
    info!("  Backend:     {}", backend_name());

    let catalog = match &config.catalog {
        Some(path) => CropCatalog::from_file(path)?,
        None => CropCatalog::builtin(),
    };

    // Load every crop model before accepting requests
    let models_dir = config.models_dir.clone();
    let loaded =
        tokio::task::spawn_blocking(move || load_builtin_models(&models_dir, &catalog)).await?;
    let (registry, report) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Refusing to start: {}", e);
            return Err(e.into());
        }
    };

    let unavailable: Vec<_> = report.failed().map(|status| status.crop.as_str()).collect();
    if !unavailable.is_empty() {
        info!("Serving without: {:?}", unavailable);
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Create shared state
    let state = Arc::new(AppState::new(config, registry, report));
    let app = routes::router(state)?;

    // Start server
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
