use crate::algorithms::WindowConfig;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::ThrottlerError;
use crate::handlers::{health_check, identity_handler, AppState};
use crate::memory::MemoryStore;
use crate::middleware::Admission;
use crate::rate_limiter::RateLimiter;
use crate::redis::RedisStore;
use crate::store::CountingStore;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the demo application: `/` is rate limited, `/health` is not.
pub fn create_app(rate_limiter: Arc<RateLimiter>) -> Router {
    let limited: Router = Admission::new(rate_limiter.clone())
        .wrap(Router::new().route("/", get(identity_handler)));

    Router::new()
        .route("/health", get(health_check))
        .with_state(AppState { rate_limiter })
        .merge(limited)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Validate the window settings, then open the configured store. Invalid
/// settings never reach the network.
pub async fn build_rate_limiter(config: &Config) -> Result<RateLimiter, ThrottlerError> {
    config.check()?;
    let window = WindowConfig::new(config.window_seconds, config.max_requests_per_window)?;

    let store: Arc<dyn CountingStore> = if config.uses_redis() {
        Arc::new(RedisStore::connect(&config.redis_url, config.redis_timeout()).await?)
    } else {
        tracing::warn!("REDIS_URL is empty, counting requests in this process only");
        Arc::new(MemoryStore::new(Arc::new(SystemClock)))
    };

    Ok(RateLimiter::with_config(window, store).with_key_prefix(config.key_prefix.clone()))
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(bind_addr: SocketAddr, rate_limiter: RateLimiter) -> Self {
        Self {
            app: create_app(Arc::new(rate_limiter)),
            bind_addr,
        }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("slidegate listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
