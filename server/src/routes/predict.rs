//! Prediction endpoint - classify one uploaded leaf image for a crop

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use cropscan::predict_bytes;

use crate::error::ApiError;
use crate::state::SharedState;

/// Successful prediction
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub crop: String,
    pub prediction: String,
    pub confidence: f32,
}

/// File and optional capture date pulled from the form
struct Upload {
    bytes: Vec<u8>,
    date: Option<String>,
}

fn upload_error(state: &SharedState, e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            limit_mb: state.config.body_limit_mb,
        }
    } else {
        warn!("Unreadable multipart body: {}", e.body_text());
        ApiError::NoFile
    }
}

async fn read_upload(state: &SharedState, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut bytes = None;
    let mut empty_filename = false;
    let mut date = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(state, e))?
    {
        let name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        match name.as_deref() {
            Some("file") if bytes.is_none() => match file_name.as_deref() {
                // A part without a filename is a plain form value, not a file
                None => {}
                Some("") => empty_filename = true,
                Some(_) => {
                    let data = field.bytes().await.map_err(|e| upload_error(state, e))?;
                    bytes = Some(data.to_vec());
                }
            },
            Some("date") => {
                date = Some(field.text().await.map_err(|e| upload_error(state, e))?);
            }
            _ => {}
        }
    }

    match bytes {
        Some(bytes) => Ok(Upload { bytes, date }),
        None if empty_filename => Err(ApiError::EmptyFilename),
        None => Err(ApiError::NoFile),
    }
}

/// Log the optional capture date; it never affects the prediction
fn log_capture_date(crop: &str, date: &str) {
    let date = date.trim();
    if date.is_empty() {
        return;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        info!("Received date for {} prediction: {}", crop, parsed.to_rfc3339());
    } else if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        info!("Received date for {} prediction: {}", crop, parsed);
    } else {
        warn!("Could not parse date string '{}' for {} prediction", date, crop);
    }
}

/// POST /predict/:crop_type - Classify an uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    Path(crop_type): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Some(entry) = state.registry.get(&crop_type).cloned() else {
        return Err(ApiError::ModelNotAvailable {
            crop: crop_type,
            available: state.registry.available_models(),
        });
    };

    let multipart = multipart.map_err(|e| {
        warn!("Request for {} is not a multipart form: {}", crop_type, e);
        ApiError::NoFile
    })?;
    let upload = read_upload(&state, multipart).await?;

    if let Some(date) = &upload.date {
        log_capture_date(&crop_type, date);
    }

    let request_id = Uuid::new_v4();
    let span = info_span!("predict", crop = %crop_type, request_id = %request_id);
    let crop = crop_type.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        predict_bytes(&crop, &entry, &upload.bytes)
    })
    .await;

    let detail = match outcome {
        Ok(Ok(prediction)) => {
            info!(
                "{} prediction {}: {} ({:.4})",
                crop_type, request_id, prediction.label, prediction.confidence
            );
            return Ok(Json(PredictResponse {
                crop: crop_type,
                prediction: prediction.label,
                confidence: prediction.confidence,
            }));
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("inference task failed: {}", e),
    };

    error!("Error during prediction for {} ({}): {}", crop_type, request_id, detail);
    Err(ApiError::PredictionFailed {
        crop: crop_type,
        detail,
    })
}
