//! HTTP handlers and router assembly for duckbridge

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::{
    cors_layer, preflight_no_content, request_id_middleware, require_api_key,
};
use crate::shared::query::RetryPolicy;
use crate::upstream::{
    CredentialProvider, PinnedCredential, ScrapingCredentialProvider, UpstreamClient,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;
pub mod openai;

/// Application state shared across all handlers
///
/// Everything is read-only after startup and Arc'd for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    upstream: Arc<UpstreamClient>,
    credentials: Arc<dyn CredentialProvider>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// Builds the pooled upstream client and the scraping credential provider.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration or HTTP client construction
    /// fails.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {}", e))
        })?);
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);

        let pinned = PinnedCredential::from_config(&config.credential);
        if pinned.is_some() {
            tracing::info!(
                max_age_seconds = config.credential.max_age_seconds,
                "Pinned upstream credential configured"
            );
        }
        let credentials: Arc<dyn CredentialProvider> = Arc::new(ScrapingCredentialProvider::new(
            upstream.clone(),
            config.upstream.fallback_assets.clone(),
            pinned,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            upstream,
            credentials,
            metrics,
        })
    }

    /// Replace the credential provider
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the upstream client
    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Get reference to the credential provider
    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    /// Get reference to the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Owned handle to the metrics collector, for spawned tasks
    pub fn metrics_handle(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Retry policy for upstream attempts
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }
}

/// Build the full application router
///
/// Layers, outermost first: pre-flight status, request id, HTTP tracing,
/// CORS. The API key check only wraps the chat completions route, so
/// pre-flight requests never need a key.
pub fn app(state: AppState) -> Router {
    let prefix = state.config().server.route_prefix().to_string();

    let completions = Router::new()
        .route(
            &format!("{}/v1/chat/completions", prefix),
            post(openai::completions::handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(health::root))
        .route("/ping", get(health::ping))
        .route("/metrics", get(metrics::handler))
        .route(
            &format!("{}/v1/models", prefix),
            get(openai::models::handler),
        )
        .merge(completions)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(preflight_no_content))
}
