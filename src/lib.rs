//! duckbridge - OpenAI-compatible adapter for the DuckDuckGo chat backend
//!
//! Accepts OpenAI Chat Completions requests, flattens them into the
//! upstream's single-prompt format, obtains a fresh session token per
//! attempt, and translates the upstream's event stream back into OpenAI
//! chunks or a single aggregated completion.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod shared;
pub mod telemetry;
pub mod upstream;
