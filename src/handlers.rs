use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::{Config, PreflightPolicy};
use crate::config_validator::ConfigValidator;
use crate::connection::StoreConnection;
use crate::error::ApiError;
use crate::health::HealthChecker;
use crate::key_generator::{ClientKey, KeyGenerator};
use crate::metrics::MetricsCollector;
use crate::profile::ProfileData;
use crate::rate_limiter::{Decision, RateLimiter};
use crate::redis::RedisConnector;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state containing the rate limiter and profile tables
pub struct AppState {
    pub limiter: RateLimiter,
    pub profile: Arc<ProfileData>,
    pub preflight_policy: PreflightPolicy,
    /// Set when the environment is unusable; `/api/me` answers 500 while it is.
    pub config_error: Option<String>,
}

impl AppState {
    pub fn new(limiter: RateLimiter, profile: Arc<ProfileData>, preflight_policy: PreflightPolicy) -> Self {
        Self {
            limiter,
            profile,
            preflight_policy,
            config_error: None,
        }
    }

    pub fn with_config_error(mut self, message: impl Into<String>) -> Self {
        self.config_error = Some(message.into());
        self
    }

    /// Build state from configuration. Misconfiguration is recorded rather
    /// than returned so the service can still report it over HTTP.
    pub fn from_config(config: &Config) -> Self {
        let mut config_error = None;

        let store = match ConfigValidator::validate_config(config) {
            Ok(Some(url)) => match RedisConnector::new(&url) {
                Ok(connector) => Some(Arc::new(StoreConnection::new(
                    Arc::new(connector),
                    config.backoff(),
                ))),
                Err(e) => {
                    error!(error = %e, "Failed to create Redis client");
                    config_error = Some("REDIS_URL invalid".to_string());
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                config_error = Some(configuration_message(e));
                None
            }
        };

        let profile = match ProfileData::load(config.profile_path.as_deref()) {
            Ok(profile) => profile,
            Err(e) => {
                config_error.get_or_insert_with(|| configuration_message(e));
                ProfileData::default()
            }
        };

        let limiter = RateLimiter::new(config.limiter_settings(), store, MetricsCollector::new());
        let state = Self::new(limiter, Arc::new(profile), config.preflight_policy);

        match config_error {
            Some(message) => state.with_config_error(message),
            None => state,
        }
    }

    fn check_environment(&self) -> Result<(), ApiError> {
        match &self.config_error {
            Some(message) => Err(ApiError::Configuration(message.clone())),
            None => Ok(()),
        }
    }
}

fn configuration_message(err: ApiError) -> String {
    match err {
        ApiError::Configuration(message) => message,
        other => other.to_string(),
    }
}

fn client_key(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    uri: &Uri,
) -> ClientKey {
    let client = KeyGenerator::client_key(headers, peer.map(|ConnectInfo(addr)| addr));

    if client.is_anonymous() {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown");
        info!(
            user_agent = %user_agent,
            path = %uri.path(),
            "Anonymous client access (applying strict rate limiting)"
        );
    }

    client
}

/// `GET /api/me`: profile payload behind the rate limiter
pub async fn get_me(
    State(state): State<SharedState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    state.check_environment()?;
    state.profile.validate_integrity()?;

    let client = client_key(&headers, peer, &uri);
    if let Decision::Rejected { retry_after, .. } = state.limiter.check(&client).await? {
        return Err(ApiError::RateLimited { retry_after });
    }

    let payload = state.profile.payload()?;
    Ok(Json(payload).into_response())
}

/// `OPTIONS /api/me`: CORS preflight
pub async fn options_me(
    State(state): State<SharedState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if state.preflight_policy == PreflightPolicy::Limited && state.config_error.is_none() {
        let client = client_key(&headers, peer, &uri);
        match state.limiter.check(&client).await {
            Ok(Decision::Rejected { retry_after, .. }) => {
                return ApiError::RateLimited { retry_after }.into_response();
            }
            Ok(_) => {}
            // A broken limiter must not block CORS preflights.
            Err(e) => debug!(error = %e, "Ignoring rate limiter failure for preflight"),
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let health = HealthChecker::new(&state).check_health().await;
    let status = match health.status.as_str() {
        "misconfigured" | "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status, Json(health))
}
