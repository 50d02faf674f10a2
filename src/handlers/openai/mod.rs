//! OpenAI-compatible API handlers
//!
//! - `POST /v1/chat/completions` - chat completions, streamed or aggregated
//! - `GET /v1/models` - list of accepted model aliases

pub mod completions;
pub mod extractor;
pub mod models;
pub mod streaming;
pub mod types;
