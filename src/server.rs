use crate::config::Config;
use crate::error::{ErrorResponse, RelayError, Result};
use crate::gateway::{GenerationGateway, OpenAiImageProvider};
use crate::handlers::{generate_image, health_check, AppState, SharedState};
use crate::middleware::logging_middleware;
use crate::rate_limiter::{FixedWindowLimiter, RateLimitAlgorithm};
use crate::validation::RequestValidator;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router around already-constructed state.
pub fn create_app(state: SharedState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/generate-image", post(generate_image))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn(logging_middleware))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
}

/// CORS restricted to an explicit list of origins.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim()).map_err(|_| {
                RelayError::Configuration(format!("Invalid CORS origin '{}'", origin))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unexpected failure".to_string()
    };

    tracing::error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error: unexpected failure")),
    )
        .into_response()
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    rate_limiter: Arc<dyn RateLimitAlgorithm>,
    cleanup_interval: Duration,
}

impl Server {
    pub fn new(config: &Config) -> Result<Self> {
        let rate_limiter: Arc<dyn RateLimitAlgorithm> =
            Arc::new(FixedWindowLimiter::new(config.rate_limit_policy()));

        let provider = Arc::new(OpenAiImageProvider::new(&config.provider_base_url)?);
        let gateway = GenerationGateway::new(
            provider,
            config.classification_table()?,
            config.image_params(),
            config.provider_timeout,
        );

        let validator = RequestValidator::new(config.credential_format(), config.max_prompt_chars);
        let state = AppState::new(validator, Arc::clone(&rate_limiter), gateway);
        let app = create_app(state, cors_layer(&config.allowed_origins)?);

        Ok(Self {
            app,
            bind_addr: config.bind_addr,
            rate_limiter,
            cleanup_interval: config.cleanup_interval,
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| RelayError::Configuration(format!("Failed to bind {}: {}", self.bind_addr, e)))?;

        tracing::info!("Image relay listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(Arc::clone(&self.rate_limiter), self.cleanup_interval, stop_rx);

        // Run server with graceful shutdown
        let served = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        let _ = stop_tx.send(true);
        let _ = sweeper.await;

        served.map_err(|e| RelayError::Internal(format!("Server error: {}", e)))
    }
}

/// Periodically evicts expired rate windows until `stop` flips to true.
pub fn spawn_sweeper(
    rate_limiter: Arc<dyn RateLimitAlgorithm>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match rate_limiter.sweep_expired() {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(removed, "Swept expired rate windows"),
                        Err(e) => tracing::warn!("Rate window sweep failed: {}", e),
                    }
                }
                _ = stop.changed() => break,
            }
        }
    })
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::rate_limiter::RateLimitPolicy;

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&["http://bad\norigin".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_windows() {
        let limiter = Arc::new(FixedWindowLimiter::new(RateLimitPolicy {
            limit: 10,
            window: Duration::from_millis(10),
        }));
        limiter.admit(&Credential::new("sk-sweepme")).unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(limiter.clone(), Duration::from_secs(1), stop_rx);

        // Window expiry is measured on the std clock, sweep cadence on tokio's.
        std::thread::sleep(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(limiter.tracked_credentials().unwrap(), 0);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
