//! Upstream chat backend integration
//!
//! - `client`: pooled HTTP client and the chat request itself
//! - `credential`: per-attempt session token acquisition
//! - `events`: decoding of the upstream's event-stream body
//! - `headers`: browser masquerade header set

pub mod client;
pub mod credential;
pub mod events;
pub mod headers;

pub use client::UpstreamClient;
pub use credential::{
    CredentialProvider, PinnedCredential, ScrapingCredentialProvider, UpstreamCredential,
};
pub use events::{UpstreamEvent, upstream_events};
