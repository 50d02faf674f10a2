//! Command-line interface for duckbridge
//!
//! Provides argument parsing and subcommand handling for the duckbridge binary.

use clap::{Parser, Subcommand};

/// Configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// OpenAI-compatible chat completions adapter for the DuckDuckGo chat backend
#[derive(Parser)]
#[command(name = "duckbridge")]
#[command(version)]
#[command(about = "OpenAI-compatible chat completions adapter for the DuckDuckGo chat backend")]
#[command(
    long_about = "duckbridge serves the OpenAI Chat Completions API and forwards every \
    conversation to the DuckDuckGo chat backend, streaming the answer back as OpenAI chunks."
)]
pub struct Cli {
    /// Path to configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Config path to load and whether it must exist
    ///
    /// An explicitly passed path must exist; the default path is optional.
    pub fn config_source(&self) -> (&str, bool) {
        match &self.config {
            Some(path) => (path.as_str(), true),
            None => (DEFAULT_CONFIG_PATH, false),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# duckbridge Configuration
# =========================
#
# Every value below is the built-in default. Environment variables override
# the file: API_PREFIX, MAX_RETRY_COUNT, RETRY_DELAY (ms), PROXY_URL, PORT,
# APIKEY.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 8787

# Prefix in front of /v1/... routes ("/" serves /v1/chat/completions,
# "/hf" serves /hf/v1/chat/completions)
api_prefix = "/"

# Shared secret for the chat endpoint. When set, clients must send
# "Authorization: Bearer <api_key>". Leave unset to disable.
# api_key = "change-me"

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM
# ─────────────────────────────────────────────────────────────────────────────

[upstream]
base_url = "https://duckduckgo.com"

# Bound for connecting, receiving headers, and each streamed body read
timeout_seconds = 30

# Outbound proxy. An unusable value is logged and ignored.
# proxy_url = "socks5://127.0.0.1:1080"

# Asset paths searched for a session token when the landing page has none
fallback_assets = ["/duck.js", "/chat.js", "/d.js"]

# ─────────────────────────────────────────────────────────────────────────────
# RETRY
# ─────────────────────────────────────────────────────────────────────────────

[retry]
# Retries after the first attempt (0 disables retrying)
max_retry_count = 3

# Constant delay before each retry, in milliseconds
retry_delay_ms = 5000

# ─────────────────────────────────────────────────────────────────────────────
# PINNED CREDENTIAL (Optional)
# ─────────────────────────────────────────────────────────────────────────────
#
# A known-good token used without scraping for max_age_seconds after startup.

[credential]
# token = "4-..."
# hash = "..."
max_age_seconds = 300

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG takes precedence)
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
