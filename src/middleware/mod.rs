//! HTTP middleware

pub mod auth;
pub mod cors;
pub mod request_id;

pub use auth::require_api_key;
pub use cors::{cors_layer, preflight_no_content};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
