//! JSON extractor with OpenAI-compatible error responses
//!
//! Wraps Axum's `Json` extractor so body rejections come back in the error
//! shape OpenAI SDKs parse, and so every malformed body is a plain 400
//! whatever `Content-Type` the client sent.

use axum::{
    Json,
    body::Bytes,
    extract::{
        FromRequest, Request,
        rejection::{BytesRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

/// OpenAI-compatible error envelope
///
/// ```json
/// {"error": {"message": "...", "type": "invalid_request_error", "param": null, "code": null}}
/// ```
#[derive(Debug, serde::Serialize)]
pub struct OpenAiError {
    pub error: OpenAiErrorBody,
}

#[derive(Debug, serde::Serialize)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl OpenAiError {
    fn with_type(message: impl Into<String>, error_type: &str) -> Self {
        Self {
            error: OpenAiErrorBody {
                message: message.into(),
                error_type: error_type.to_string(),
                param: None,
                code: None,
            },
        }
    }

    /// Error caused by the inbound request
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_type(message, "invalid_request_error")
    }

    /// Error raised after a stream has already started
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::with_type(message, "server_error")
    }
}

/// Body rejection rendered in the OpenAI error shape
///
/// - body that cannot be read → the status axum reports (413 when too large)
/// - bad syntax or wrong field types → 400
///
/// The `Content-Type` header is not checked, so `curl -d` bodies decode.
pub enum OpenAiJsonRejection {
    Body(BytesRejection),
    Json(JsonRejection),
}

impl IntoResponse for OpenAiJsonRejection {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Body(rejection) => (rejection.status(), rejection.body_text()),
            Self::Json(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
        };
        tracing::debug!(status = status.as_u16(), reason = %message, "Rejected request body");
        (status, Json(OpenAiError::invalid_request(message))).into_response()
    }
}

/// `Json` replacement for OpenAI-compatible handlers
pub struct OpenAiJson<T>(pub T);

impl<S, T> FromRequest<S> for OpenAiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = OpenAiJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(OpenAiJsonRejection::Body)?;
        let Json(value) = Json::<T>::from_bytes(&bytes).map_err(OpenAiJsonRejection::Json)?;
        Ok(OpenAiJson(value))
    }
}
