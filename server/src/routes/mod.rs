//! HTTP routes

pub mod health;
pub mod models;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Any origin, or exactly the configured one
pub fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match origin {
        Some(origin) => layer.allow_origin(origin.parse::<HeaderValue>()?),
        None => layer.allow_origin(Any),
    })
}

/// Build the application router
pub fn router(state: SharedState) -> anyhow::Result<Router> {
    let cors = cors_layer(state.config.cors_origin.as_deref())?;
    let body_limit = state.config.body_limit_bytes();

    Ok(Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Models
        .route("/models", get(models::list_models))
        // Prediction
        .route("/predict/:crop_type", post(predict::predict))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_must_be_a_header_value() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("http://localhost:3000")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
    }
}
