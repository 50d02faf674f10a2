//! Cross-origin access
//!
//! Any origin, method and header is allowed. Pre-flight `OPTIONS` requests
//! are answered by the CORS layer and reported as `204 No Content`.

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::cors::CorsLayer;

/// CORS layer allowing every origin, method and header
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

/// Rewrite successful `OPTIONS` answers to 204
///
/// Must wrap [`cors_layer`], which answers every `OPTIONS` request itself
/// with an empty 200.
pub async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;

    if is_options && response.status().is_success() {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }

    response
}
