//! Liveness endpoint

use axum::Json;
use serde::Serialize;

pub const PING_MESSAGE: &str = "Model is running!";

#[derive(Serialize)]
pub struct PingResponse {
    pub message: &'static str,
}

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: PING_MESSAGE,
    })
}
