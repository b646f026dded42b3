use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::rate_limiter::{Backend, Decision};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterMetrics {
    pub total_requests: u64,
    pub admitted_requests: u64,
    pub throttled_requests: u64,
    /// Requests admitted because the limiter itself failed.
    pub failed_open: u64,
    /// Decisions counted in Redis.
    pub redis_decisions: u64,
    /// Requests that fell back to in-memory counting because Redis was unreachable.
    pub memory_fallbacks: u64,
    pub backend_errors: u64,
    pub counting_since: u64,
}

impl Default for LimiterMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            admitted_requests: 0,
            throttled_requests: 0,
            failed_open: 0,
            redis_decisions: 0,
            memory_fallbacks: 0,
            backend_errors: 0,
            counting_since: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<LimiterMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_decision(&self, decision: &Decision) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        match decision {
            Decision::Admitted { backend, .. } => {
                metrics.admitted_requests += 1;
                if *backend == Backend::Redis {
                    metrics.redis_decisions += 1;
                }
            }
            Decision::Rejected { backend, .. } => {
                metrics.throttled_requests += 1;
                if *backend == Backend::Redis {
                    metrics.redis_decisions += 1;
                }
            }
            Decision::FailedOpen => {
                metrics.admitted_requests += 1;
                metrics.failed_open += 1;
            }
        }
    }

    pub async fn record_fallback(&self) {
        self.metrics.write().await.memory_fallbacks += 1;
    }

    pub async fn record_backend_error(&self) {
        self.metrics.write().await.backend_errors += 1;
    }

    pub async fn snapshot(&self) -> LimiterMetrics {
        self.metrics.read().await.clone()
    }
}
