//! Liveness endpoints
//!
//! `GET /` and `GET /ping` answer without touching the upstream, for load
//! balancers and quick manual checks.

use axum::Json;
use serde::Serialize;

/// Body of the liveness endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// GET / handler
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "duckbridge is running",
    })
}

/// GET /ping handler
pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse { message: "pong" })
}
