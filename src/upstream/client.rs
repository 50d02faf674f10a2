//! HTTP client for the upstream chat endpoint
//!
//! One pooled `reqwest::Client` is built at startup and shared by the chat
//! sender and the credential scraper.

use super::credential::UpstreamCredential;
use super::headers::{VQD_HASH_HEADER, VQD_TOKEN_HEADER, masquerade_headers};
use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};
use crate::handlers::openai::types::UpstreamChatRequest;
use crate::middleware::RequestId;
use crate::telemetry::redact;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::time::Duration;

/// Path of the upstream chat endpoint
pub const CHAT_PATH: &str = "/duckchat/v1/chat";

/// Client for the upstream chat backend
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build the client from configuration
    ///
    /// A proxy that cannot be parsed or applied is logged and skipped; the
    /// client then connects directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be turned into headers or if
    /// the HTTP client cannot be built even without a proxy.
    pub fn new(config: &UpstreamConfig) -> AppResult<Self> {
        let headers = masquerade_headers(config.base_url())?;
        let http = build_http_client(config.proxy_url())?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            headers,
            timeout: config.timeout(),
        })
    }

    /// Underlying pooled HTTP client
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Upstream root without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Masquerade headers applied to every upstream request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Bound for the connect+headers phase and for each body read
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for an upstream path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a flattened prompt to the chat endpoint
    ///
    /// Returns the response once a 2xx status line and headers have arrived;
    /// the body is left unread for the caller to stream.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport` on network failure or timeout
    /// - `AppError::UpstreamStatus` on a non-2xx answer, carrying its body
    pub async fn send(
        &self,
        prompt: &str,
        model: &str,
        credential: &UpstreamCredential,
        request_id: RequestId,
    ) -> AppResult<reqwest::Response> {
        let body = UpstreamChatRequest::new(model, prompt);

        let mut request = self
            .http
            .post(self.url(CHAT_PATH))
            .headers(self.headers.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(VQD_TOKEN_HEADER, credential.token())
            .json(&body);
        if let Some(hash) = credential.hash() {
            request = request.header(VQD_HASH_HEADER, hash);
        }

        tracing::debug!(
            request_id = %request_id,
            model = %model,
            prompt_length = prompt.len(),
            token = %redact(credential.token()),
            has_hash = credential.hash().is_some(),
            "Sending upstream chat request"
        );

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "Upstream chat request failed"
                );
                return Err(AppError::Transport(e.to_string()));
            }
            Err(_elapsed) => {
                tracing::warn!(
                    request_id = %request_id,
                    timeout_seconds = self.timeout.as_secs(),
                    "Upstream chat request timed out"
                );
                return Err(AppError::Transport(format!(
                    "no response from upstream within {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = match tokio::time::timeout(self.timeout, response.text()).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => format!("<unreadable body: {}>", e),
                Err(_) => "<body read timed out>".to_string(),
            };
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                body_length = body.len(),
                "Upstream chat request rejected"
            );
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

/// Build the pooled client, degrading to a direct connection on proxy errors
///
/// No total request timeout is set on the client: streamed bodies may run far
/// longer than any single read, so timeouts are applied per operation.
fn build_http_client(proxy_url: Option<&str>) -> AppResult<reqwest::Client> {
    if let Some(url) = proxy_url {
        match reqwest::Proxy::all(url) {
            Ok(proxy) => match reqwest::Client::builder().proxy(proxy).build() {
                Ok(client) => {
                    tracing::info!(proxy_url = %url, "Upstream requests will use proxy");
                    return Ok(client);
                }
                Err(e) => {
                    tracing::warn!(
                        proxy_url = %url,
                        error = %e,
                        "Failed to build HTTP client with proxy, connecting directly"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    proxy_url = %url,
                    error = %e,
                    "Invalid proxy URL, connecting directly"
                );
            }
        }
    }

    reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}
