//! Model listing endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

/// Load status of one catalog crop
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub crop: String,
    pub loaded: bool,
    pub labels: Vec<String>,
    pub input_height: Option<usize>,
    pub input_width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /models - Every catalog crop with its startup outcome
pub async fn list_models(State(state): State<SharedState>) -> Json<Vec<ModelInfo>> {
    let models = state
        .report
        .crops
        .iter()
        .map(|status| ModelInfo {
            crop: status.crop.clone(),
            loaded: status.loaded,
            labels: status.labels.clone(),
            input_height: status.input_height,
            input_width: status.input_width,
            error: status.error.clone(),
        })
        .collect();
    Json(models)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::test_support::{get, json_body, test_app};

    #[tokio::test]
    async fn test_models_reports_failures() {
        let response = get(test_app(), "/models").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let models = body.as_array().unwrap();
        assert_eq!(models.len(), 2);

        assert_eq!(models[0]["crop"], "tomato");
        assert_eq!(models[0]["loaded"], false);
        assert!(models[0]["error"].as_str().unwrap().contains("not found"));

        assert_eq!(models[1]["crop"], "maize");
        assert_eq!(models[1]["loaded"], true);
        assert_eq!(models[1]["input_height"], 256);
        assert!(models[1].get("error").is_none());
    }
}
