//! Upstream credential acquisition
//!
//! Every chat call needs a short-lived session token. It is scraped fresh for
//! each attempt by walking a fixed chain of sources:
//!
//! 1. the landing page HTML
//! 2. script assets the landing page references under `/dist/`
//! 3. well-known fallback assets
//! 4. the status endpoint's response headers
//!
//! Each text source is searched by an ordered list of pure extractor
//! functions; the first non-empty capture wins.

use super::client::UpstreamClient;
use super::headers::{VQD_ACCEPT_HEADER, VQD_HASH_HEADER, VQD_TOKEN_HEADER};
use crate::config::CredentialConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::{CredentialSource, Metrics};
use crate::middleware::RequestId;
use crate::telemetry::redact;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

/// Path of the status endpoint probed as the last resort
pub const STATUS_PATH: &str = "/duckchat/v1/status";

/// Token plus optional auxiliary hash authorizing one upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCredential {
    token: String,
    hash: Option<String>,
}

impl UpstreamCredential {
    pub fn new(token: impl Into<String>, hash: Option<String>) -> Self {
        Self {
            token: token.into(),
            hash: hash.filter(|h| !h.is_empty()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }
}

/// Source of upstream credentials
///
/// Implemented by the live scraper; tests substitute scripted providers.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a credential for one upstream attempt
    ///
    /// # Errors
    ///
    /// Returns `AppError::TokenUnavailable` when no source yields a token.
    async fn acquire(&self, request_id: RequestId) -> AppResult<UpstreamCredential>;
}

// =============================================================================
// Extractors
// =============================================================================

/// A pure token extractor over a text body
pub type Extractor = fn(&str) -> Option<String>;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static VQD_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| compile(r#"vqd=["']([^"']+)["']"#));
static VQD_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| compile(r#"vqd[:=]["']([^"']+)["']"#));
static VQD_JSON: LazyLock<Regex> = LazyLock::new(|| compile(r#""vqd":"([^"]+)""#));
static VQD_JSON_SINGLE: LazyLock<Regex> = LazyLock::new(|| compile(r"'vqd':'([^']+)'"));
static VQD_ASSIGNMENT_SPACED: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"vqd\s*[:=]\s*["']([^"']+)["']"#));
static VQD_JSON_SPACED: LazyLock<Regex> = LazyLock::new(|| compile(r#""vqd"\s*:\s*"([^"]+)""#));
static VQD_JSON_SINGLE_SPACED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"'vqd'\s*:\s*'([^']+)'"));
static SCRIPT_ASSET: LazyLock<Regex> = LazyLock::new(|| compile(r#"(/dist/[^"']+\.js)"#));

fn first_capture(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

/// `vqd="..."` as an HTML attribute
pub fn vqd_attribute(body: &str) -> Option<String> {
    first_capture(&VQD_ATTRIBUTE, body)
}

/// `vqd:"..."` or `vqd='...'` without whitespace
pub fn vqd_assignment(body: &str) -> Option<String> {
    first_capture(&VQD_ASSIGNMENT, body)
}

/// `"vqd":"..."` in compact JSON
pub fn vqd_json(body: &str) -> Option<String> {
    first_capture(&VQD_JSON, body)
}

/// `'vqd':'...'` in a single-quoted object literal
pub fn vqd_json_single(body: &str) -> Option<String> {
    first_capture(&VQD_JSON_SINGLE, body)
}

/// `vqd = "..."` with optional whitespace
pub fn vqd_assignment_spaced(body: &str) -> Option<String> {
    first_capture(&VQD_ASSIGNMENT_SPACED, body)
}

/// `"vqd" : "..."` with optional whitespace
pub fn vqd_json_spaced(body: &str) -> Option<String> {
    first_capture(&VQD_JSON_SPACED, body)
}

/// `'vqd' : '...'` with optional whitespace
pub fn vqd_json_single_spaced(body: &str) -> Option<String> {
    first_capture(&VQD_JSON_SINGLE_SPACED, body)
}

/// Extractors tried against the landing page, in order
pub const LANDING_EXTRACTORS: &[Extractor] =
    &[vqd_attribute, vqd_assignment, vqd_json, vqd_json_single];

/// Extractors tried against referenced script assets, in order
pub const ASSET_EXTRACTORS: &[Extractor] = &[vqd_assignment_spaced, vqd_json_spaced];

/// Extractors tried against fallback assets, in order
pub const FALLBACK_EXTRACTORS: &[Extractor] =
    &[vqd_assignment_spaced, vqd_json_spaced, vqd_json_single_spaced];

/// Run extractors in order and return the first hit
pub fn extract_token(body: &str, extractors: &[Extractor]) -> Option<String> {
    extractors.iter().find_map(|extract| extract(body))
}

/// Script asset paths referenced by a page, deduplicated, in order of appearance
pub fn script_asset_paths(body: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for captures in SCRIPT_ASSET.captures_iter(body) {
        if let Some(m) = captures.get(1) {
            let path = m.as_str();
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
    }
    paths
}

// =============================================================================
// Pinned Credential
// =============================================================================

/// Credential supplied by configuration, valid for a fixed window
#[derive(Debug, Clone)]
pub struct PinnedCredential {
    credential: UpstreamCredential,
    expires_at: Instant,
}

impl PinnedCredential {
    /// Build from configuration, measuring `max_age` from now
    ///
    /// Returns `None` when no token is configured.
    pub fn from_config(config: &CredentialConfig) -> Option<Self> {
        let token = config.token.as_deref().filter(|t| !t.is_empty())?;
        Some(Self {
            credential: UpstreamCredential::new(token, config.hash.clone()),
            expires_at: Instant::now() + Duration::from_secs(config.max_age_seconds),
        })
    }

    /// The credential, if still inside its window
    pub fn fresh(&self) -> Option<&UpstreamCredential> {
        (Instant::now() < self.expires_at).then_some(&self.credential)
    }
}

// =============================================================================
// Scraping Provider
// =============================================================================

/// Live credential provider that scrapes the upstream's public pages
pub struct ScrapingCredentialProvider {
    upstream: Arc<UpstreamClient>,
    fallback_assets: Vec<String>,
    pinned: Option<PinnedCredential>,
    metrics: Arc<Metrics>,
}

impl ScrapingCredentialProvider {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        fallback_assets: Vec<String>,
        pinned: Option<PinnedCredential>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            upstream,
            fallback_assets,
            pinned,
            metrics,
        }
    }

    /// Walk the source chain and report which source produced the credential
    pub async fn acquire_with_source(
        &self,
        request_id: RequestId,
    ) -> AppResult<(UpstreamCredential, CredentialSource)> {
        if let Some(credential) = self.pinned.as_ref().and_then(PinnedCredential::fresh) {
            return Ok((credential.clone(), CredentialSource::Pinned));
        }

        match self.fetch_text("/", request_id).await {
            Ok(landing) => {
                if let Some(token) = extract_token(&landing, LANDING_EXTRACTORS) {
                    return Ok((
                        UpstreamCredential::new(token, None),
                        CredentialSource::LandingPage,
                    ));
                }

                for asset in script_asset_paths(&landing) {
                    let Ok(body) = self.fetch_text(&asset, request_id).await else {
                        continue;
                    };
                    if let Some(token) = extract_token(&body, ASSET_EXTRACTORS) {
                        tracing::debug!(request_id = %request_id, asset = %asset, "Token found in script asset");
                        return Ok((
                            UpstreamCredential::new(token, None),
                            CredentialSource::ScriptAsset,
                        ));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "Landing page unavailable, skipping page and script asset extraction"
                );
            }
        }

        for asset in &self.fallback_assets {
            let Ok(body) = self.fetch_text(asset, request_id).await else {
                continue;
            };
            if let Some(token) = extract_token(&body, FALLBACK_EXTRACTORS) {
                tracing::debug!(request_id = %request_id, asset = %asset, "Token found in fallback asset");
                return Ok((
                    UpstreamCredential::new(token, None),
                    CredentialSource::FallbackAsset,
                ));
            }
        }

        self.probe_status(request_id)
            .await
            .map(|credential| (credential, CredentialSource::StatusHeader))
    }

    /// GET an upstream path and return its body as text
    ///
    /// Non-2xx answers are errors so that error pages are never searched.
    async fn fetch_text(&self, path: &str, request_id: RequestId) -> AppResult<String> {
        let url = self.upstream.url(path);
        let response = self
            .upstream
            .http()
            .get(&url)
            .headers(self.upstream.headers().clone())
            .timeout(self.upstream.timeout())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(request_id = %request_id, url = %url, error = %e, "Credential source fetch failed");
                AppError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(request_id = %request_id, url = %url, status = status.as_u16(), "Credential source returned non-success status");
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(response.text().await?)
    }

    /// Ask the status endpoint to issue a token in its response headers
    async fn probe_status(&self, request_id: RequestId) -> AppResult<UpstreamCredential> {
        let response = self
            .upstream
            .http()
            .get(self.upstream.url(STATUS_PATH))
            .headers(self.upstream.headers().clone())
            .header(VQD_ACCEPT_HEADER, "1")
            .timeout(self.upstream.timeout())
            .send()
            .await
            .map_err(|e| AppError::TokenUnavailable(format!("status probe failed: {}", e)))?;

        let header_text = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        match header_text(VQD_TOKEN_HEADER) {
            Some(token) => Ok(UpstreamCredential::new(token, header_text(VQD_HASH_HEADER))),
            None => {
                tracing::debug!(
                    request_id = %request_id,
                    status = response.status().as_u16(),
                    "Status probe returned no token header"
                );
                Err(AppError::TokenUnavailable(
                    "could not find vqd token using any method".to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for ScrapingCredentialProvider {
    async fn acquire(&self, request_id: RequestId) -> AppResult<UpstreamCredential> {
        match self.acquire_with_source(request_id).await {
            Ok((credential, source)) => {
                self.metrics.record_credential(source);
                tracing::info!(
                    request_id = %request_id,
                    source = source.as_str(),
                    token = %redact(credential.token()),
                    has_hash = credential.hash().is_some(),
                    "Acquired upstream token"
                );
                Ok(credential)
            }
            Err(e) => {
                self.metrics.record_credential(CredentialSource::Failed);
                tracing::warn!(request_id = %request_id, error = %e, "Token acquisition failed");
                Err(e)
            }
        }
    }
}
