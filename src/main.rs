//! duckbridge HTTP server
//!
//! Starts an Axum web server exposing the OpenAI Chat Completions API on top
//! of the DuckDuckGo chat backend.

use clap::Parser;
use duckbridge::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration (file, then environment)
    let (config_path, required) = cli.config_source();
    let config = Config::load(config_path, required)?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    let prefix = config.server.route_prefix().to_string();
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        api_prefix = %config.server.api_prefix,
        auth_enabled = config.server.api_key().is_some(),
        proxy_configured = config.upstream.proxy_url().is_some(),
        max_retry_count = config.retry.max_retry_count,
        retry_delay_ms = config.retry.retry_delay_ms,
        "Starting duckbridge"
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(Arc::new(config))?;
    let app = handlers::app(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!(
        "Chat completions available at http://{}{}/v1/chat/completions",
        addr,
        prefix
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
