//! Shared-secret authentication for the chat endpoint
//!
//! When an API key is configured, callers must send
//! `Authorization: Bearer <key>`. Without a configured key every request
//! passes through.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::middleware::RequestId;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

const BEARER_PREFIX: &str = "Bearer ";

/// Check a raw `Authorization` header value against the expected key
///
/// # Errors
///
/// Returns `AppError::Unauthorized` when the header is missing, is not a
/// bearer credential, or carries the wrong key.
pub fn check_bearer(header: Option<&str>, expected: &str) -> Result<(), AppError> {
    let header = header.ok_or_else(|| AppError::Unauthorized("API key required".to_string()))?;

    let key = header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        AppError::Unauthorized(
            "Invalid authorization format, expected 'Bearer <key>'".to_string(),
        )
    })?;

    if key != expected {
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}

/// Middleware rejecting requests without the configured API key
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config().server.api_key() {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        if let Err(e) = check_bearer(header, expected) {
            let request_id = request.extensions().get::<RequestId>().copied();
            tracing::warn!(
                request_id = ?request_id.map(|id| id.to_string()),
                reason = %e,
                "Rejected unauthenticated request"
            );
            return Err(e);
        }
    }

    Ok(next.run(request).await)
}
