//! Configuration management for duckbridge
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variable overrides. The resulting [`Config`] is immutable and
//! shared read-only by every request.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for upstream timeouts (seconds)
const MAX_TIMEOUT_SECONDS: u64 = 300;
/// Upper bound for the number of retries after the first attempt
const MAX_RETRY_COUNT_LIMIT: usize = 20;
/// Upper bound for the fixed inter-attempt delay (milliseconds)
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix mounted in front of the `/v1/...` routes
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Shared secret for inbound `Authorization: Bearer` checks. `None`
    /// disables inbound authentication.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            api_key: None,
        }
    }
}

impl ServerConfig {
    /// The API prefix with any trailing slash removed
    ///
    /// The default prefix `/` normalizes to an empty string so routes land
    /// at `/v1/...`.
    pub fn route_prefix(&self) -> &str {
        self.api_prefix.trim_end_matches('/')
    }

    /// The configured API key, treating an empty value as unset
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_api_prefix() -> String {
    "/".to_string()
}

/// Upstream chat backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Scheme and host of the upstream, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call timeout for every outbound request and body read
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Optional outbound proxy (`http://`, `https://` or `socks5://`)
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Asset paths probed when the landing page and its scripts carry no token
    #[serde(default = "default_fallback_assets")]
    pub fallback_assets: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            proxy_url: None,
            fallback_assets: default_fallback_assets(),
        }
    }
}

impl UpstreamConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Per-call timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The configured proxy, treating an empty value as unset
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref().filter(|p| !p.trim().is_empty())
    }
}

fn default_base_url() -> String {
    "https://duckduckgo.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_fallback_assets() -> Vec<String> {
    vec![
        "/duck.js".to_string(),
        "/chat.js".to_string(),
        "/d.js".to_string(),
    ]
}

/// Retry policy for the upstream pipeline
///
/// One initial attempt is always made, followed by up to `max_retry_count`
/// retries separated by a constant `retry_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Fixed delay slept before every retry
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_max_retry_count() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

/// Optional pinned upstream credential
///
/// When `token` is set it is used without scraping until `max_age_seconds`
/// have passed since startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default = "default_credential_max_age")]
    pub max_age_seconds: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token: None,
            hash: None,
            max_age_seconds: default_credential_max_age(),
        }
    }
}

fn default_credential_max_age() -> u64 {
    300
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load the effective process configuration
    ///
    /// Reads `path` if it exists (a missing file is only an error when
    /// `required` is set), then applies environment overrides and validates
    /// the result.
    pub fn load<P: AsRef<Path>>(path: P, required: bool) -> AppResult<Self> {
        let mut config = if path.as_ref().exists() || required {
            Self::from_file(path.as_ref())?
        } else {
            tracing::debug!(
                path = %path.as_ref().display(),
                "No configuration file found, using defaults"
            );
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    ///
    /// Recognized keys: `API_PREFIX`, `MAX_RETRY_COUNT`, `RETRY_DELAY`
    /// (milliseconds), `PROXY_URL`, `PORT`, `APIKEY`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("API_PREFIX") {
            self.server.api_prefix = prefix;
        }
        if let Some(count) = lookup("MAX_RETRY_COUNT") {
            self.retry.max_retry_count = parse_env("MAX_RETRY_COUNT", &count)?;
        }
        if let Some(delay) = lookup("RETRY_DELAY") {
            self.retry.retry_delay_ms = parse_env("RETRY_DELAY", &delay)?;
        }
        if let Some(proxy) = lookup("PROXY_URL") {
            self.upstream.proxy_url = Some(proxy);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(key) = lookup("APIKEY") {
            self.server.api_key = Some(key);
        }
        Ok(())
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        if !self.server.api_prefix.starts_with('/') {
            return Err(AppError::Config(format!(
                "server.api_prefix must start with '/', got '{}'",
                self.server.api_prefix
            )));
        }

        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "upstream.base_url must start with 'http://' or 'https://', got '{}'",
                self.upstream.base_url
            )));
        }

        if self.upstream.timeout_seconds == 0 {
            return Err(AppError::Config(
                "upstream.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.upstream.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "upstream.timeout_seconds cannot exceed {} seconds, got {}",
                MAX_TIMEOUT_SECONDS, self.upstream.timeout_seconds
            )));
        }

        for asset in &self.upstream.fallback_assets {
            if !asset.starts_with('/') {
                return Err(AppError::Config(format!(
                    "upstream.fallback_assets entries must be absolute paths, got '{}'",
                    asset
                )));
            }
        }

        if self.retry.max_retry_count > MAX_RETRY_COUNT_LIMIT {
            return Err(AppError::Config(format!(
                "retry.max_retry_count cannot exceed {}, got {}",
                MAX_RETRY_COUNT_LIMIT, self.retry.max_retry_count
            )));
        }
        if self.retry.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(AppError::Config(format!(
                "retry.retry_delay_ms cannot exceed {} ms, got {}",
                MAX_RETRY_DELAY_MS, self.retry.retry_delay_ms
            )));
        }

        if self.credential.hash.is_some() && self.credential.token.is_none() {
            return Err(AppError::Config(
                "credential.hash requires credential.token to be set".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        AppError::Config(format!(
            "environment variable {} has invalid value '{}': {}",
            key, value, e
        ))
    })
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 9000
api_prefix = "/hf/"
api_key = "secret"

[upstream]
base_url = "http://localhost:4010/"
timeout_seconds = 10
proxy_url = "socks5://127.0.0.1:1080"

[retry]
max_retry_count = 5
retry_delay_ms = 250

[observability]
log_level = "debug"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.route_prefix(), "");
        assert!(config.server.api_key().is_none());
        assert_eq!(config.upstream.base_url(), "https://duckduckgo.com");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_retry_count, 3);
        assert_eq!(config.retry.retry_delay(), Duration::from_millis(5000));
        assert_eq!(config.upstream.fallback_assets.len(), 3);
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn test_config_from_str_parses_all_sections() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.route_prefix(), "/hf");
        assert_eq!(config.server.api_key(), Some("secret"));
        assert_eq!(config.upstream.base_url(), "http://localhost:4010");
        assert_eq!(config.upstream.proxy_url(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.retry.max_retry_count, 5);
        assert_eq!(config.retry.retry_delay_ms, 250);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_str("").expect("empty config is valid");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.retry.max_retry_count, 3);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config
            .apply_env_overrides(env(&[
                ("API_PREFIX", "/api"),
                ("MAX_RETRY_COUNT", "1"),
                ("RETRY_DELAY", "10"),
                ("PROXY_URL", "http://proxy:3128"),
                ("PORT", "8080"),
                ("APIKEY", "other"),
            ]))
            .unwrap();

        assert_eq!(config.server.route_prefix(), "/api");
        assert_eq!(config.retry.max_retry_count, 1);
        assert_eq!(config.retry.retry_delay_ms, 10);
        assert_eq!(config.upstream.proxy_url(), Some("http://proxy:3128"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_key(), Some("other"));
    }

    #[test]
    fn test_env_override_rejects_non_numeric_retry_count() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[("MAX_RETRY_COUNT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_RETRY_COUNT"));
    }

    #[test]
    fn test_empty_api_key_disables_auth() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("APIKEY", "")])).unwrap();
        assert!(config.server.api_key().is_none());
    }

    #[test]
    fn test_empty_proxy_is_unset() {
        let mut config = Config::default();
        config.upstream.proxy_url = Some("  ".to_string());
        assert!(config.upstream.proxy_url().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.upstream.base_url = "duckduckgo.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.upstream.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_excessive_retry_delay() {
        let mut config = Config::default();
        config.retry.retry_delay_ms = MAX_RETRY_DELAY_MS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_prefix() {
        let mut config = Config::default();
        config.server.api_prefix = "v1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_hash_without_token() {
        let mut config = Config::default();
        config.credential.hash = Some("abc".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AppError::ConfigFileRead { .. }));
    }

    #[test]
    fn test_load_tolerates_missing_optional_file() {
        let config = Config::load("/definitely/not/here.toml", false).expect("defaults");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, TEST_CONFIG).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_from_file_wraps_validation_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upstream]\ntimeout_seconds = 0\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidationFailed { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
