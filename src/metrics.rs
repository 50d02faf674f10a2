//! Prometheus metrics collection for duckbridge
//!
//! This module provides metrics instrumentation for tracking:
//! - Inbound chat requests by response mode
//! - Upstream attempts by outcome
//! - Credential acquisitions by extraction source
//! - End-to-end request latency
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Response mode label for `requests_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Server-sent events, one chunk per upstream fragment
    Stream,
    /// Single aggregated `chat.completion` object
    Aggregate,
}

impl Mode {
    /// Convert mode to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Stream => "stream",
            Mode::Aggregate => "aggregate",
        }
    }
}

/// Where an upstream credential was found
///
/// Bounded set so the `source` label cannot explode in cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Pinned,
    LandingPage,
    ScriptAsset,
    FallbackAsset,
    StatusHeader,
    Failed,
}

impl CredentialSource {
    /// Convert source to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Pinned => "pinned",
            CredentialSource::LandingPage => "landing_page",
            CredentialSource::ScriptAsset => "script_asset",
            CredentialSource::FallbackAsset => "fallback_asset",
            CredentialSource::StatusHeader => "status_header",
            CredentialSource::Failed => "failed",
        }
    }
}

/// Metrics collector for duckbridge
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    upstream_attempts: IntCounterVec,
    credential_acquisitions: IntCounterVec,
    request_duration: HistogramVec,
    stream_decode_errors: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "duckbridge_requests_total",
                "Total number of chat completion requests by response mode",
            ),
            &["mode"],
        )?;

        // Cardinality: bounded by AppError::kind() plus "success"
        let upstream_attempts = IntCounterVec::new(
            Opts::new(
                "duckbridge_upstream_attempts_total",
                "Total number of upstream pipeline attempts by outcome",
            ),
            &["outcome"],
        )?;

        let credential_acquisitions = IntCounterVec::new(
            Opts::new(
                "duckbridge_token_acquisitions_total",
                "Total number of upstream credential acquisitions by source",
            ),
            &["source"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "duckbridge_request_duration_ms",
                "Time until the upstream response was committed, in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["mode"],
        )?;

        let stream_decode_errors = IntCounter::with_opts(Opts::new(
            "duckbridge_stream_decode_errors_total",
            "Upstream event records that could not be decoded and were skipped",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_attempts.clone()))?;
        registry.register(Box::new(credential_acquisitions.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(stream_decode_errors.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            upstream_attempts,
            credential_acquisitions,
            request_duration,
            stream_decode_errors,
        })
    }

    /// Record an inbound chat request
    pub fn record_request(&self, mode: Mode) {
        self.requests_total.with_label_values(&[mode.as_str()]).inc();
    }

    /// Record the outcome of one upstream attempt
    ///
    /// `outcome` is `"success"` or an [`AppError::kind`](crate::error::AppError::kind).
    pub fn record_attempt(&self, outcome: &'static str) {
        self.upstream_attempts.with_label_values(&[outcome]).inc();
    }

    /// Record where a credential came from (or that none was found)
    pub fn record_credential(&self, source: CredentialSource) {
        self.credential_acquisitions
            .with_label_values(&[source.as_str()])
            .inc();
    }

    /// Record time until the response was committed
    ///
    /// Non-finite or negative values are dropped; they would poison the
    /// histogram's percentiles.
    pub fn record_duration(&self, mode: Mode, duration_ms: f64) {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            tracing::warn!(duration_ms, "Dropping invalid duration sample");
            return;
        }
        self.request_duration
            .with_label_values(&[mode.as_str()])
            .observe(duration_ms);
    }

    /// Record a skipped upstream record
    pub fn stream_decode_error(&self) {
        self.stream_decode_errors.inc();
    }

    /// Number of skipped upstream records so far
    pub fn stream_decode_errors_count(&self) -> u64 {
        self.stream_decode_errors.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            tracing::error!(error = %e, "Prometheus encoder produced invalid UTF-8");
            prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics.record_request(Mode::Stream);
        metrics.record_attempt("success");
        metrics.record_credential(CredentialSource::StatusHeader);
        metrics.record_duration(Mode::Aggregate, 12.5);
        metrics.stream_decode_error();

        let output = metrics.gather().expect("gather should succeed");
        assert!(output.contains("duckbridge_requests_total{mode=\"stream\"} 1"));
        assert!(output.contains("duckbridge_upstream_attempts_total{outcome=\"success\"} 1"));
        assert!(output.contains("duckbridge_token_acquisitions_total{source=\"status_header\"} 1"));
        assert!(output.contains("duckbridge_request_duration_ms"));
        assert!(output.contains("duckbridge_stream_decode_errors_total 1"));
    }

    #[test]
    fn test_invalid_duration_is_dropped() {
        let metrics = Metrics::new().unwrap();
        metrics.record_duration(Mode::Stream, f64::NAN);
        metrics.record_duration(Mode::Stream, -1.0);

        let output = metrics.gather().unwrap();
        assert!(!output.contains("duckbridge_request_duration_ms_count{mode=\"stream\"}"));
    }

    #[test]
    fn test_decode_error_counter() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.stream_decode_errors_count(), 0);
        metrics.stream_decode_error();
        metrics.stream_decode_error();
        assert_eq!(metrics.stream_decode_errors_count(), 2);
    }
}
