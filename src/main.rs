use anyhow::Result;
use clap::Parser;
use slidegate::config::Config;
use slidegate::server::{build_rate_limiter, Server};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line overrides; anything unset falls back to the environment.
#[derive(Debug, Parser)]
#[command(name = "slidegate", version, about = "Sliding window rate limiting demo server")]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Redis URL; pass an empty string to count in-process
    #[arg(long)]
    redis_url: Option<String>,

    /// Rolling window length in seconds
    #[arg(long)]
    window_seconds: Option<u64>,

    /// Requests allowed per window
    #[arg(long)]
    max_requests: Option<u64>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(redis_url) = self.redis_url {
            config.redis_url = redis_url;
        }
        if let Some(window_seconds) = self.window_seconds {
            config.window_seconds = window_seconds;
        }
        if let Some(max_requests) = self.max_requests {
            config.max_requests_per_window = max_requests;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map(|config| cli.apply(config))
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("slidegate={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting slidegate");
    tracing::info!(
        bind_addr = %config.bind_addr,
        redis_url = %config.redis_url,
        window_seconds = config.window_seconds,
        max_requests_per_window = config.max_requests_per_window,
        "Configuration loaded"
    );

    let rate_limiter = build_rate_limiter(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create rate limiter: {}", e))?;

    Server::new(config.bind_addr, rate_limiter)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
