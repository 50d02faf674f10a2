//! OpenAI-compatible models list handler
//!
//! Handles GET /v1/models requests.

use crate::models::ModelAlias;
use axum::{Json, response::IntoResponse};

use super::types::{ModelObject, ModelsListResponse};

/// Owner reported for every advertised model
pub const MODEL_OWNER: &str = "ddg";

/// GET /v1/models handler
///
/// Lists the public aliases clients may put in `model`. Unknown names are
/// still accepted by the completions endpoint and fall back to the default
/// alias.
pub async fn handler() -> impl IntoResponse {
    Json(models_list())
}

/// Build the models list in advertised order
pub fn models_list() -> ModelsListResponse {
    ModelsListResponse::new(
        ModelAlias::ALL
            .iter()
            .map(|alias| ModelObject::new(alias.as_str(), MODEL_OWNER))
            .collect(),
    )
}
