use envconfig::Envconfig;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::connection::Backoff;
use crate::rate_limiter::LimiterSettings;

/// Whether `REDIS_URL` must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// A missing URL is a configuration error.
    Required,
    /// A missing URL means in-memory limiting.
    Optional,
}

/// What a request does when the configured store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachablePolicy {
    /// Answer 503 (500 for rejected credentials).
    Fail,
    /// Count the request in memory instead.
    Degrade,
}

/// What the limiter does when its own backend fails mid-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    Open,
    Closed,
}

/// How CORS preflight requests interact with the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightPolicy {
    /// Preflights count against the client's window; limiter errors never block them.
    Limited,
    /// Preflights always succeed.
    Exempt,
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(StoreMode::Required),
            "optional" => Ok(StoreMode::Optional),
            other => Err(format!("unknown store mode '{}'", other)),
        }
    }
}

impl FromStr for UnreachablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(UnreachablePolicy::Fail),
            "degrade" => Ok(UnreachablePolicy::Degrade),
            other => Err(format!("unknown unreachable policy '{}'", other)),
        }
    }
}

impl FromStr for FailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailPolicy::Open),
            "closed" => Ok(FailPolicy::Closed),
            other => Err(format!("unknown fail policy '{}'", other)),
        }
    }
}

impl FromStr for PreflightPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limited" => Ok(PreflightPolicy::Limited),
            "exempt" => Ok(PreflightPolicy::Exempt),
            other => Err(format!("unknown preflight policy '{}'", other)),
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Required => write!(f, "required"),
            StoreMode::Optional => write!(f, "optional"),
        }
    }
}

impl fmt::Display for UnreachablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachablePolicy::Fail => write!(f, "fail"),
            UnreachablePolicy::Degrade => write!(f, "degrade"),
        }
    }
}

impl fmt::Display for FailPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailPolicy::Open => write!(f, "open"),
            FailPolicy::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL, unset for in-memory limiting
    #[envconfig(from = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[envconfig(from = "REDIS_MODE", default = "optional")]
    pub redis_mode: StoreMode,

    #[envconfig(from = "REDIS_UNREACHABLE", default = "fail")]
    pub redis_unreachable: UnreachablePolicy,

    /// Requests per window for identified clients
    #[envconfig(from = "RATE_LIMIT_MAX_REQUESTS", default = "10")]
    pub max_requests: u64,

    /// Requests per window for the shared anonymous bucket
    #[envconfig(from = "RATE_LIMIT_ANONYMOUS_MAX_REQUESTS", default = "1")]
    pub anonymous_max_requests: u64,

    #[envconfig(from = "RATE_LIMIT_WINDOW_SECS", default = "60")]
    pub window_secs: u64,

    #[envconfig(from = "RATE_LIMIT_FAIL_POLICY", default = "open")]
    pub fail_policy: FailPolicy,

    #[envconfig(from = "PREFLIGHT_POLICY", default = "limited")]
    pub preflight_policy: PreflightPolicy,

    /// Seconds between sweeps of expired in-memory windows
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    #[envconfig(from = "REDIS_CONNECT_RETRIES", default = "3")]
    pub connect_retries: u32,

    #[envconfig(from = "REDIS_BACKOFF_BASE_MS", default = "200")]
    pub backoff_base_ms: u64,

    #[envconfig(from = "REDIS_BACKOFF_CAP_MS", default = "5000")]
    pub backoff_cap_ms: u64,

    #[envconfig(from = "REDIS_CONNECT_TIMEOUT_MS", default = "2000")]
    pub connect_timeout_ms: u64,

    /// Pause after a failed connect before the next attempt
    #[envconfig(from = "REDIS_RETRY_COOLDOWN_MS", default = "10000")]
    pub retry_cooldown_ms: u64,

    /// JSON file replacing the built-in profile tables
    #[envconfig(from = "PROFILE_PATH")]
    pub profile_path: Option<PathBuf>,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Configured Redis URL; an empty value counts as unset.
    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn limiter_settings(&self) -> LimiterSettings {
        LimiterSettings {
            max_requests: self.max_requests,
            anonymous_max_requests: self.anonymous_max_requests,
            window: self.window(),
            on_unreachable: self.redis_unreachable,
            fail_policy: self.fail_policy,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            retries: self.connect_retries,
            base: Duration::from_millis(self.backoff_base_ms),
            cap: Duration::from_millis(self.backoff_cap_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            cooldown: Duration::from_millis(self.retry_cooldown_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            redis_url: None,
            redis_mode: StoreMode::Optional,
            redis_unreachable: UnreachablePolicy::Fail,
            max_requests: 10,
            anonymous_max_requests: 1,
            window_secs: 60,
            fail_policy: FailPolicy::Open,
            preflight_policy: PreflightPolicy::Limited,
            cleanup_interval_secs: 300,
            connect_retries: 3,
            backoff_base_ms: 200,
            backoff_cap_ms: 5000,
            connect_timeout_ms: 2000,
            retry_cooldown_ms: 10_000,
            profile_path: None,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_redis_url_is_unset() {
        let config = Config {
            redis_url: Some("   ".to_string()),
            ..Config::default()
        };
        assert_eq!(config.redis_url(), None);

        let config = Config {
            redis_url: Some("redis://localhost:6379".to_string()),
            ..Config::default()
        };
        assert_eq!(config.redis_url(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Required".parse::<StoreMode>().unwrap(), StoreMode::Required);
        assert_eq!("closed".parse::<FailPolicy>().unwrap(), FailPolicy::Closed);
        assert_eq!("exempt".parse::<PreflightPolicy>().unwrap(), PreflightPolicy::Exempt);
        assert_eq!("Degrade".parse::<UnreachablePolicy>().unwrap(), UnreachablePolicy::Degrade);
        assert!("sometimes".parse::<FailPolicy>().is_err());
    }

    #[test]
    fn test_limiter_settings_from_config() {
        let config = Config {
            max_requests: 5,
            window_secs: 30,
            ..Config::default()
        };
        let settings = config.limiter_settings();
        assert_eq!(settings.max_requests, 5);
        assert_eq!(settings.anonymous_max_requests, 1);
        assert_eq!(settings.window, Duration::from_secs(30));
        assert_eq!(settings.on_unreachable, UnreachablePolicy::Fail);
    }
}
