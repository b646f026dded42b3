use anyhow::Result;
use clap::Parser;
use portfolio_api::config::Config;
use portfolio_api::handlers::AppState;
use portfolio_api::redis::redact_credentials;
use portfolio_api::server::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Portfolio profile API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Override BIND_ADDR
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Override LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("portfolio_api={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting portfolio API");
    tracing::info!(
        bind_addr = %config.bind_addr,
        redis_url = %config.redis_url().map(redact_credentials).unwrap_or_else(|| "<unset>".to_string()),
        redis_mode = %config.redis_mode,
        redis_unreachable = %config.redis_unreachable,
        fail_policy = %config.fail_policy,
        max_requests = config.max_requests,
        window_secs = config.window_secs,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(&config));
    if let Some(problem) = &state.config_error {
        tracing::error!(
            problem = %problem,
            "Server misconfigured, /api/me will answer 500 until the environment is fixed"
        );
    }

    Server::new(&config, state)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
