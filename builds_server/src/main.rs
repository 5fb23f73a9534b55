//! Snap Builds Server: the publisher dashboard's build pages.
//!
//! Links snaps to GitHub repositories, registers their recipes on Launchpad,
//! lists and triggers builds, and rebuilds on GitHub push webhooks.

mod config;
mod error;
mod metrics;
mod models;
mod routes;
mod services;
mod session;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use clap::Parser;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::services::dashboard_service::DashboardClient;
use crate::services::github_service::GitHubConnector;
use crate::services::launchpad_service::LaunchpadClient;
use crate::session::MemorySessionStore;

#[derive(Parser)]
#[command(name = "snap-builds", about = "Snap builds dashboard service")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "BUILDS_PORT", default_value = "8004")]
    port: u16,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    request_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Snap Builds Server...");

    let config = Arc::new(config::BuildsConfig::from_env());

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(concat!("snap-builds/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let dashboard = DashboardClient::new(http.clone(), config.dashboard_api_url.clone());
    let launchpad = LaunchpadClient::new(
        http.clone(),
        config.launchpad_api_url.clone(),
        config.launchpad_username.clone(),
        config.launchpad_token.clone(),
        config.launchpad_token_secret.clone(),
    );
    let github = GitHubConnector::new(
        http,
        config.github_api_url.clone(),
        config.github_webhook_secret.clone(),
    );

    let state = routes::AppState {
        config,
        dashboard: Arc::new(dashboard),
        launchpad: Arc::new(launchpad),
        github: Arc::new(github),
        sessions: Arc::new(MemorySessionStore::new()),
    };

    let app = with_middleware(
        routes::builds_router(state),
        Duration::from_secs(cli.request_timeout),
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Snap Builds Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

/// Request timeout answered with 408, plus request tracing.
fn with_middleware(app: Router, request_timeout: Duration) -> Router {
    app.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        request_timeout,
    ))
    .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
