//! Application state for the prediction server
//!
//! Holds the read-only model registry built at startup and the load report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use cropscan::{LoadReport, ModelRegistry};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory containing weight files and descriptors
    pub models_dir: PathBuf,
    /// Optional JSON catalog replacing the built-in crops
    pub catalog: Option<PathBuf>,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    /// Maximum request body size in MiB
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            models_dir: PathBuf::from(cropscan::DEFAULT_MODELS_DIR),
            catalog: None,
            cors_origin: None,
            body_limit_mb: 16,
        }
    }
}

impl ServerConfig {
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Crops that loaded successfully
    pub registry: ModelRegistry,
    /// Outcome of every crop at startup
    pub report: LoadReport,
    /// Server start time
    pub started_at: Instant,
    /// Wall-clock start time
    pub started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, registry: ModelRegistry, report: LoadReport) -> Self {
        Self {
            config,
            registry,
            report,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
