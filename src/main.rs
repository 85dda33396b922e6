//! Livechat Ingest server
//!
//! Serves the webhook endpoint and the operator API, and optionally starts
//! scraping a channel right away.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use livechat_ingest::config::IngestConfig;
use livechat_ingest::handlers::{router, AppState};
use livechat_ingest::session::ChromiumPageSource;
use livechat_ingest::webhook::SignatureVerifier;

/// Livechat Ingest server
#[derive(Parser, Debug)]
#[command(name = "lc-ingest")]
#[command(version)]
#[command(about = "Live chat ingestion from signed webhooks and a browser scraper")]
struct Args {
    /// Port to listen on [env: LIVECHAT_PORT, default 8000]
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to [env: LIVECHAT_HOST, default 127.0.0.1]
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,

    /// Start scraping this channel on launch
    #[arg(short, long)]
    channel: Option<String>,

    /// PEM file with the webhook verifying key (built-in key otherwise)
    #[arg(long)]
    public_key: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Run the browser headless (true/false)
    #[arg(long)]
    headless: Option<bool>,
}

impl Args {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(path) = &self.public_key {
            config.webhook.public_key_path = Some(path.clone());
        }
        if let Some(path) = &self.chrome_path {
            config.scraper.browser.chrome_path = Some(path.clone());
        }
        if let Some(headless) = self.headless {
            config.scraper.browser.headless = headless;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = IngestConfig::from_env().context("invalid environment configuration")?;
    args.apply(&mut config);

    let verifier = SignatureVerifier::load(config.webhook.public_key_path.as_deref())
        .context("failed to load webhook public key")?;
    if !verifier.has_key() {
        tracing::warn!("No usable webhook key; every delivery will be rejected");
    }

    let source = Arc::new(
        ChromiumPageSource::new(config.scraper.browser.clone())
            .with_navigation_timeout(config.scraper.navigation_timeout_ms),
    );
    let (state, drain) = AppState::build(&config, verifier, source);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drain_task = tokio::spawn(drain.run(shutdown_rx));

    if let Some(channel) = args.channel.clone() {
        let scraper = state.scraper().clone();
        tokio::spawn(async move {
            if let Err(e) = scraper.start(&channel).await {
                tracing::error!(error = %e, "Initial scraper start failed");
            }
        });
    }

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Livechat Ingest listening on {}", addr);

    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down");
    state.scraper().stop().await;
    let _ = shutdown_tx.send(true);
    match drain_task.await {
        Ok(stats) => tracing::info!(?stats, "Drain loop finished"),
        Err(e) => tracing::warn!(error = %e, "Drain loop ended abnormally"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
