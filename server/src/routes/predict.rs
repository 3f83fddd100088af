//! Prediction endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{debug, info};

use tomato_disease::inference::Prediction;
use tomato_disease::TomatoError;

use crate::error::{Result, ServerError};
use crate::state::SharedState;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

pub const INVALID_IMAGE: &str = "Invalid image";

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Prediction(Prediction),
    Error { error: &'static str },
}

/// POST /predict - classify an uploaded leaf image
///
/// Undecodable uploads answer 200 with `{"error": "Invalid image"}`.
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
        debug!("Received file: {} ({} bytes)", file_name, data.len());
        upload = Some(data);
        break;
    }

    let data = upload.ok_or(ServerError::MissingField(FILE_FIELD))?;

    let predictor = state.predictor().await;
    let outcome = tokio::task::spawn_blocking(move || predictor.predict_bytes(&data))
        .await
        .map_err(|e| ServerError::Internal(format!("inference task failed: {}", e)))?;

    match outcome {
        Ok(result) => {
            let prediction = result.to_prediction();
            info!(
                "Predicted {} ({:.4}) in {:.1} ms",
                prediction.class_name, prediction.confidence, result.inference_time_ms
            );
            Ok(Json(PredictResponse::Prediction(prediction)))
        }
        Err(TomatoError::InvalidImage(reason)) => {
            debug!("Rejected upload: {}", reason);
            Ok(Json(PredictResponse::Error {
                error: INVALID_IMAGE,
            }))
        }
        Err(e) => Err(e.into()),
    }
}
