//! Supervised demo server.
//!
//! Loads an optional TOML config, installs logging and metrics, and serves a
//! small router until SIGINT/SIGTERM, then shuts down gracefully.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use http_supervisor::config::{load_config, Config, Options};
use http_supervisor::lifecycle::cancel_on_signal;
use http_supervisor::observability::{self, MetricsMonitor, Monitor, NopMonitor};
use http_supervisor::ShutdownSignal;

#[derive(Parser)]
#[command(name = "http-supervisor")]
#[command(about = "HTTP server with supervised listen/serve/shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address (`host:port`, `:port`, `unix://path`).
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    observability::logging::init(&config.observability.log_filter);
    tracing::info!("http-supervisor v{} starting", env!("CARGO_PKG_VERSION"));

    let monitor: Arc<dyn Monitor> = if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                observability::metrics::init_metrics(addr);
                Arc::new(MetricsMonitor)
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
                Arc::new(NopMonitor)
            }
        }
    } else {
        Arc::new(NopMonitor)
    };

    let parent = CancellationToken::new();
    let signals = cancel_on_signal(parent.clone());

    let mut options = Options::from_config(&config)
        .await?
        .context(parent.clone())
        .handler(demo_router())
        .monitor(monitor);
    if let Some(listen) = &cli.listen {
        options = options.listen_address(listen);
    }

    let supervisor = options.build();
    supervisor.listen().await;

    parent.cancel();
    let _ = signals.await;
    Ok(())
}

fn demo_router() -> Router {
    Router::new()
        .route("/", get(|| async { "ok\n" }))
        .route("/panic", get(panicking))
        .route("/slow", get(slow))
        .layer(TraceLayer::new_for_http())
}

async fn panicking() -> &'static str {
    panic!("demo handler panic")
}

/// Takes ten seconds unless the server is shutting down hard.
async fn slow(Extension(shutdown): Extension<ShutdownSignal>) -> &'static str {
    tokio::select! {
        () = tokio::time::sleep(Duration::from_secs(10)) => "done\n",
        () = shutdown.cancelled() => "interrupted by shutdown\n",
    }
}
