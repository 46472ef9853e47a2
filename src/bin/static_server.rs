//! Serves a local directory over HTTP with permissive CORS.

use anyhow::{Context, Result};
use clap::Parser;
use imagegen_relay::server::shutdown_signal;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "static-server", version, about = "Static file server for the relay frontend")]
struct StaticConfig {
    /// Server bind address
    #[arg(long, env = "STATIC_BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// Directory to serve
    #[arg(long, env = "STATIC_ROOT", default_value = ".")]
    root: PathBuf,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = StaticConfig::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("static_server={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = axum::Router::new()
        .fallback_service(ServeDir::new(&config.root).append_index_html_on_directories(true))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        "Serving {} on http://{}",
        config.root.display(),
        config.bind_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Static server error")?;

    Ok(())
}
