use redis::IntoConnectionInfo;
use tracing::error;

use crate::config::{Config, StoreMode};
use crate::error::ApiError;
use crate::redis::redact_credentials;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ApiError> {
        if url.is_empty() {
            return Err(ApiError::Configuration("REDIS_URL invalid".to_string()));
        }

        let scheme_ok = ["redis://", "rediss://", "redis+unix://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !scheme_ok {
            error!(redis_url = %redact_credentials(url), "REDIS_URL has an unsupported scheme");
            return Err(ApiError::Configuration("REDIS_URL invalid".to_string()));
        }

        url.into_connection_info().map_err(|e| {
            error!(redis_url = %redact_credentials(url), error = %e, "REDIS_URL does not parse");
            ApiError::Configuration("REDIS_URL invalid".to_string())
        })?;

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(max_requests: u64, window_secs: u64) -> Result<(), ApiError> {
        if max_requests == 0 {
            return Err(ApiError::Configuration(
                "rate limit must be greater than 0".to_string(),
            ));
        }

        if window_secs == 0 {
            return Err(ApiError::Configuration(
                "rate limit window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The store URL to connect to, if any.
    pub fn validate_store(config: &Config) -> Result<Option<String>, ApiError> {
        match (config.redis_url(), config.redis_mode) {
            (None, StoreMode::Required) => {
                error!("REDIS_MODE=required but REDIS_URL is not set");
                Err(ApiError::Configuration("REDIS_URL missing".to_string()))
            }
            (None, StoreMode::Optional) => Ok(None),
            (Some(url), _) => {
                Self::validate_redis_url(url)?;
                Ok(Some(url.to_string()))
            }
        }
    }

    /// Validates everything a request depends on.
    pub fn validate_config(config: &Config) -> Result<Option<String>, ApiError> {
        Self::validate_rate_limit(config.max_requests, config.window_secs)?;
        Self::validate_rate_limit(config.anonymous_max_requests, config.window_secs)?;
        Self::validate_store(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://user:pw@localhost:6380/1").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
        assert!(ConfigValidator::validate_redis_url("not a url").is_err());
        assert!(ConfigValidator::validate_redis_url("unix:///tmp/redis.sock").is_err());
    }

    #[test]
    fn test_invalid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(10, 60).is_ok());
        assert!(ConfigValidator::validate_rate_limit(0, 60).is_err());
        assert!(ConfigValidator::validate_rate_limit(10, 0).is_err());
    }

    #[test]
    fn test_required_store_without_url() {
        let config = Config {
            redis_mode: StoreMode::Required,
            ..Config::default()
        };
        let err = ConfigValidator::validate_store(&config).unwrap_err();
        assert_eq!(err.to_string(), "Server misconfigured: REDIS_URL missing");
    }

    #[test]
    fn test_optional_store_without_url() {
        assert_eq!(ConfigValidator::validate_store(&Config::default()).unwrap(), None);
    }

    #[test]
    fn test_store_url_is_validated() {
        let config = Config {
            redis_url: Some("ftp://cache:21".to_string()),
            ..Config::default()
        };
        assert!(ConfigValidator::validate_config(&config).is_err());

        let config = Config {
            redis_url: Some("redis://cache:6379".to_string()),
            ..Config::default()
        };
        assert_eq!(
            ConfigValidator::validate_config(&config).unwrap().as_deref(),
            Some("redis://cache:6379")
        );
    }
}
