//! Error types for duckbridge
//!
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Inbound shared-secret check failed. Never retried.
    #[error("{0}")]
    Unauthorized(String),

    /// No extraction strategy yielded an upstream credential
    #[error("Unable to obtain upstream token: {0}")]
    TokenUnavailable(String),

    /// Network or timeout failure while talking to the upstream
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// The upstream answered with a non-2xx status
    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// A single upstream record could not be decoded. Logged and skipped,
    /// never fatal to an attempt.
    #[error("Failed to decode upstream record: {0}")]
    StreamDecode(String),

    /// The inbound client stopped accepting data
    #[error("Failed to write response: {0}")]
    Write(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the retry orchestrator may try again after this error
    ///
    /// Upstream-facing failures are retried; anything caused by the inbound
    /// request or by local configuration is returned immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenUnavailable(_)
                | Self::Transport(_)
                | Self::UpstreamStatus { .. }
        )
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => "config",
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::TokenUnavailable(_) => "token_unavailable",
            Self::Transport(_) => "transport",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::StreamDecode(_) => "stream_decode",
            Self::Write(_) => "write",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
