use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FailPolicy, UnreachablePolicy};
use crate::connection::{ConnectionState, StoreConnection};
use crate::error::{ApiError, StoreError};
use crate::key_generator::ClientKey;
use crate::metrics::MetricsCollector;
use crate::redis::{CounterStore, WindowCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterSettings {
    pub max_requests: u64,
    pub anonymous_max_requests: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub on_unreachable: UnreachablePolicy,
    pub fail_policy: FailPolicy,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            anonymous_max_requests: 1,
            window: Duration::from_secs(60),
            on_unreachable: UnreachablePolicy::Fail,
            fail_policy: FailPolicy::Open,
        }
    }
}

/// Where a decision's counter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted { remaining: u64, backend: Backend },
    Rejected { retry_after: Duration, backend: Backend },
    /// The backend failed and the fail-open policy let the request through.
    FailedOpen,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Rejected { .. })
    }
}

/// In-memory state for one client's current window.
#[derive(Debug, Clone)]
struct LocalWindow {
    count: u64,
    reset_at: Instant,
}

/// Process-local fixed-window counters.
#[derive(Debug, Default)]
pub struct MemoryWindows {
    windows: Mutex<HashMap<String, LocalWindow>>,
}

impl MemoryWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_at(&self, key: &str, limit: u64, window: Duration, now: Instant) -> WindowCount {
        let mut windows = self.lock();

        match windows.get_mut(key) {
            Some(entry) if now < entry.reset_at => {
                if entry.count >= limit {
                    return WindowCount {
                        admitted: false,
                        count: entry.count,
                        reset_after: entry.reset_at - now,
                    };
                }
                entry.count += 1;
                WindowCount {
                    admitted: true,
                    count: entry.count,
                    reset_after: entry.reset_at - now,
                }
            }
            _ => {
                // First hit, or the previous window has expired.
                windows.insert(
                    key.to_string(),
                    LocalWindow {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                WindowCount {
                    admitted: true,
                    count: 1,
                    reset_after: window,
                }
            }
        }
    }

    /// Drop windows that have expired, returning how many were removed.
    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, entry| now < entry.reset_at);
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CounterStore for MemoryWindows {
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> Result<WindowCount, StoreError> {
        Ok(self.hit_at(key, limit, window, Instant::now()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn quit(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Fixed-window rate limiter backed by Redis, falling back to memory.
#[derive(Clone)]
pub struct RateLimiter {
    settings: Arc<LimiterSettings>,
    local: Arc<MemoryWindows>,
    store: Option<Arc<StoreConnection>>,
    metrics: MetricsCollector,
}

impl RateLimiter {
    pub fn new(
        settings: LimiterSettings,
        store: Option<Arc<StoreConnection>>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            local: Arc::new(MemoryWindows::new()),
            store,
            metrics,
        }
    }

    /// Limiter that never talks to an external store.
    pub fn in_memory(settings: LimiterSettings) -> Self {
        Self::new(settings, None, MetricsCollector::new())
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn limit_for(&self, client: &ClientKey) -> u64 {
        if client.is_anonymous() {
            self.settings.anonymous_max_requests
        } else {
            self.settings.max_requests
        }
    }

    /// Count one request for `client` and decide whether to admit it.
    pub async fn check(&self, client: &ClientKey) -> Result<Decision, ApiError> {
        let limit = self.limit_for(client);
        let key = client.as_str();

        let (count, backend) = match self.connected_store().await? {
            Some((connection, store)) => {
                match store.hit(key, limit, self.settings.window).await {
                    Ok(count) => (count, Backend::Redis),
                    Err(err) => {
                        if err.is_transient() {
                            connection.invalidate();
                        }
                        return self.on_backend_failure(err).await;
                    }
                }
            }
            None => (
                self.local.hit_at(key, limit, self.settings.window, Instant::now()),
                Backend::Memory,
            ),
        };

        let decision = if count.admitted {
            Decision::Admitted {
                remaining: limit.saturating_sub(count.count),
                backend,
            }
        } else {
            debug!(client = %key, count = count.count, limit, "Rate limit exceeded");
            Decision::Rejected {
                retry_after: count.reset_after,
                backend,
            }
        };

        self.metrics.record_decision(&decision).await;
        Ok(decision)
    }

    /// Open the store connection ahead of the first request.
    pub async fn init(&self) {
        let Some(connection) = &self.store else {
            info!("Redis URL not provided, using in-memory rate limiting");
            return;
        };

        match connection.get().await {
            Ok(_) => info!(redis_url = %connection.target(), "Rate limiter using Redis"),
            Err(e) => warn!(
                redis_url = %connection.target(),
                error = %e,
                "Redis not reachable at startup, will retry on demand"
            ),
        }
    }

    /// Close the store connection.
    pub async fn shutdown(&self) {
        if let Some(connection) = &self.store {
            connection.shutdown().await;
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.local.cleanup_expired_at(Instant::now())
    }

    /// Periodically sweep expired in-memory windows.
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Cleaned up expired rate limit windows");
                }
            }
        })
    }

    pub fn store_state(&self) -> Option<ConnectionState> {
        self.store.as_ref().map(|connection| connection.state())
    }

    pub fn last_store_error(&self) -> Option<StoreError> {
        self.store.as_ref().and_then(|connection| connection.last_error())
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn local_windows(&self) -> usize {
        self.local.len()
    }

    async fn connected_store(
        &self,
    ) -> Result<Option<(&Arc<StoreConnection>, Arc<dyn CounterStore>)>, ApiError> {
        let Some(connection) = &self.store else {
            return Ok(None);
        };

        match connection.get().await {
            Ok(store) => Ok(Some((connection, store))),
            Err(err) => match self.settings.on_unreachable {
                UnreachablePolicy::Fail => Err(err.into()),
                UnreachablePolicy::Degrade => {
                    warn!(
                        redis_url = %connection.target(),
                        error = %err,
                        "Redis unavailable, falling back to in-memory rate limiting"
                    );
                    self.metrics.record_fallback().await;
                    Ok(None)
                }
            },
        }
    }

    async fn on_backend_failure(&self, err: StoreError) -> Result<Decision, ApiError> {
        self.metrics.record_backend_error().await;

        match self.settings.fail_policy {
            FailPolicy::Open => {
                warn!(error = %err, "Rate limiter failed, allowing request");
                let decision = Decision::FailedOpen;
                self.metrics.record_decision(&decision).await;
                Ok(decision)
            }
            FailPolicy::Closed => Err(ApiError::LimiterFailure(err.to_string())),
        }
    }
}
