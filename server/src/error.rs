//! API error responses
//!
//! Every per-request failure becomes one of these at the handler boundary and
//! is rendered as `{"error": ..., "available_models"?: [...]}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Prediction model for \"{crop}\" is not available or failed to load on server startup.")]
    ModelNotAvailable { crop: String, available: Vec<String> },

    #[error("No image file uploaded.")]
    NoFile,

    #[error("No selected file.")]
    EmptyFilename,

    #[error("Upload exceeds the {limit_mb} MiB request limit.")]
    PayloadTooLarge { limit_mb: usize },

    #[error("Prediction failed for {crop}: An internal server error occurred. Please check the image or try again later. Details: {detail}")]
    PredictionFailed { crop: String, detail: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelNotAvailable { .. } => StatusCode::NOT_FOUND,
            ApiError::NoFile | ApiError::EmptyFilename => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::PredictionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let available_models = match self {
            ApiError::ModelNotAvailable { available, .. } => Some(available),
            _ => None,
        };
        (
            status,
            Json(ErrorBody {
                error,
                available_models,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let not_found = ApiError::ModelNotAvailable {
            crop: "tomato".to_string(),
            available: vec!["maize".to_string()],
        };
        assert_eq!(
            not_found.to_string(),
            "Prediction model for \"tomato\" is not available or failed to load on server startup."
        );
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let failed = ApiError::PredictionFailed {
            crop: "maize".to_string(),
            detail: "boom".to_string(),
        };
        assert!(failed.to_string().starts_with("Prediction failed for maize: "));
        assert!(failed.to_string().ends_with("Details: boom"));
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
