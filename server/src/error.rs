//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Model error: {0}")]
    Model(#[from] tomato_disease::TomatoError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::MissingField(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
            ServerError::Model(e) => {
                tracing::error!(detail = %e, "Inference failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Inference failed. Check server logs for details.".to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
