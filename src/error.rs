use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the `/api/me` pipeline.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Fatal misconfiguration. The message is a fixed phrase safe to show clients.
    #[error("Server misconfigured: {0}")]
    Configuration(String),

    #[error("Redis unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Too Many Requests")]
    RateLimited { retry_after: Duration },

    #[error("Rate limiter failure: {0}")]
    LimiterFailure(String),
}

/// Failures talking to the external counter store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Refused, timed out, unresolvable or dropped. Worth retrying.
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// Bad URL or credentials. Retrying will not help.
    #[error("store misconfigured: {0}")]
    Misconfigured(String),

    #[error("store command failed: {0}")]
    Command(String),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal()
            || err.is_timeout()
            || err.is_io_error()
            || err.is_connection_dropped()
        {
            return StoreError::Unavailable(err.to_string());
        }

        match err.kind() {
            redis::ErrorKind::AuthenticationFailed | redis::ErrorKind::InvalidClientConfig => {
                StoreError::Misconfigured(err.to_string())
            }
            _ => StoreError::Command(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ApiError::StoreUnavailable(msg),
            StoreError::Misconfigured(_) => ApiError::Configuration("Redis unavailable".to_string()),
            StoreError::Command(msg) => ApiError::LimiterFailure(msg),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::Configuration(_) => Self::new(err.to_string()),
            ApiError::StoreUnavailable(_) => {
                Self::new("Redis temporarily unavailable - please try again")
            }
            ApiError::RateLimited { .. } => Self::new("Too Many Requests"),
            ApiError::LimiterFailure(_) => Self::new("Rate limiter unavailable - please try again"),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::StoreUnavailable(_) | ApiError::LimiterFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Whole seconds a client should wait, never below one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after } => Some(retry_after_secs(*retry_after)),
            _ => None,
        }
    }
}

pub(crate) fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        }

        let mut response = (status, Json(ErrorResponse::from_api_error(&self))).into_response();
        if let Some(secs) = self.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Configuration("REDIS_URL invalid".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::StoreUnavailable("refused".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::RateLimited { retry_after: Duration::from_secs(5) }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_retry_after_rounds_up_and_never_zero() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_store_error_mapping_hides_details() {
        let err: ApiError = StoreError::Unavailable("connection refused 10.0.0.1".into()).into();
        let body = ErrorResponse::from_api_error(&err);
        assert_eq!(body.error, "Redis temporarily unavailable - please try again");

        let err: ApiError = StoreError::Misconfigured("WRONGPASS".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ErrorResponse::from_api_error(&err).error,
            "Server misconfigured: Redis unavailable"
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = ApiError::RateLimited { retry_after: Duration::from_millis(42_300) }
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "43");
    }
}
