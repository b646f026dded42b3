use crate::config::Config;
use crate::handlers::{get_me, health_check, options_me, SharedState};
use crate::health;
use crate::middleware::logging_middleware;
use crate::response::standard_headers;
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn create_app(state: SharedState) -> Router {
    let api: Router<SharedState> = standard_headers().into_iter().fold(
        Router::new().route("/api/me", get(get_me).options(options_me)),
        |router, (name, value)| router.layer(SetResponseHeaderLayer::overriding(name, value)),
    );

    Router::new()
        .merge(api)
        .route("/health", get(health_check).layer(CorsLayer::permissive()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    state: SharedState,
    bind_addr: SocketAddr,
    cleanup_interval: Duration,
}

impl Server {
    pub fn new(config: &Config, state: SharedState) -> Self {
        Self {
            app: create_app(state.clone()),
            state,
            bind_addr: config.bind_addr,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        health::mark_started();

        self.state.limiter.init().await;
        let cleanup = self.state.limiter.spawn_cleanup(self.cleanup_interval);

        tracing::info!("Portfolio API listening on {}", listener.local_addr()?);
        tracing::info!("Profile available at /api/me");
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        let served = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        cleanup.abort();
        self.state.limiter.shutdown().await;
        tracing::info!("Server stopped");

        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
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
