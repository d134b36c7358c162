//! Health check endpoint

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub version: String,
    pub backend: String,
    pub models_loaded: Vec<String>,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        started_at: state.started_at_utc,
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: cropscan::backend::backend_name().to_string(),
        models_loaded: state.registry.available_models(),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::test_support::{get, json_body, test_app};

    #[tokio::test]
    async fn test_health_lists_loaded_models() {
        let response = get(test_app(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models_loaded"], serde_json::json!(["maize"]));
        assert!(body["backend"].is_string());
    }
}
