use serde::Serialize;
use std::time::SystemTime;

use crate::config::{PreflightPolicy, UnreachablePolicy};
use crate::connection::ConnectionState;
use crate::handlers::AppState;
use crate::metrics::LimiterMetrics;
use crate::rate_limiter::LimiterSettings;
use crate::redis::redact_credentials;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub dependencies: DependencyStatus,
    pub limiter: LimiterStatus,
}

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub redis: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LimiterStatus {
    pub settings: LimiterSettings,
    pub preflight_policy: PreflightPolicy,
    pub local_windows: usize,
    pub metrics: LimiterMetrics,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker<'a> {
    state: &'a AppState,
}

impl<'a> HealthChecker<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let redis = self.check_redis();
        let status = if self.state.config_error.is_some() {
            "misconfigured"
        } else if redis.status == "connected" || redis.status == "not_configured" {
            "healthy"
        } else if redis.status == "failed"
            && self.state.limiter.settings().on_unreachable == UnreachablePolicy::Fail
        {
            "unavailable"
        } else {
            "degraded"
        };

        HealthStatus {
            status: status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            error: self
                .state
                .config_error
                .as_ref()
                .map(|msg| format!("Server misconfigured: {}", msg)),
            dependencies: DependencyStatus { redis },
            limiter: LimiterStatus {
                settings: *self.state.limiter.settings(),
                preflight_policy: self.state.preflight_policy,
                local_windows: self.state.limiter.local_windows(),
                metrics: self.state.limiter.metrics().snapshot().await,
            },
        }
    }

    fn check_redis(&self) -> ServiceStatus {
        let Some(state) = self.state.limiter.store_state() else {
            return ServiceStatus {
                status: "not_configured".to_string(),
                error: None,
            };
        };

        let status = match state {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };

        ServiceStatus {
            status: status.to_string(),
            error: self
                .state
                .limiter
                .last_store_error()
                .map(|e| redact_credentials(&e.to_string())),
        }
    }
}

/// Start the uptime clock.
pub fn mark_started() {
    std::sync::LazyLock::force(&START_TIME);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiter;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_without_store() {
        let state = AppState::new(
            RateLimiter::in_memory(LimiterSettings::default()),
            Arc::new(crate::profile::ProfileData::default()),
            PreflightPolicy::Limited,
        );
        let health = HealthChecker::new(&state).check_health().await;

        assert_eq!(health.status, "healthy");
        assert_eq!(health.dependencies.redis.status, "not_configured");

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["limiter"]["settings"]["window"], "1m");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_health_reports_misconfiguration() {
        let state = AppState::new(
            RateLimiter::in_memory(LimiterSettings::default()),
            Arc::new(crate::profile::ProfileData::default()),
            PreflightPolicy::Limited,
        )
        .with_config_error("REDIS_URL invalid");
        let health = HealthChecker::new(&state).check_health().await;

        assert_eq!(health.status, "misconfigured");
        assert_eq!(health.error.as_deref(), Some("Server misconfigured: REDIS_URL invalid"));
    }
}
