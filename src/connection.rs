//! Lifecycle of the single shared connection to the counter store.
//!
//! The connection is opened lazily on first use. Concurrent callers that
//! arrive while an attempt is in flight wait for that attempt instead of
//! opening their own. A failed attempt is forgotten; callers arriving within
//! the cooldown get its error back, and the first caller after it starts a
//! fresh attempt.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::redis::{CounterStore, StoreConnector};

type ConnectResult = Result<Arc<dyn CounterStore>, StoreError>;
type Attempt = Arc<OnceCell<ConnectResult>>;

/// Retry budget and capped exponential backoff for connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Backoff {
    /// Retries after the first try.
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    #[serde(with = "humantime_serde")]
    pub cap: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// How long a terminal failure is reused before the next attempt.
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Backoff {
    /// Delay before retry number `retry` (zero-based): `base * 2^retry`, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Default)]
struct Slot {
    attempt: Option<Attempt>,
    last_error: Option<StoreError>,
    failed_at: Option<Instant>,
}

pub struct StoreConnection {
    connector: Arc<dyn StoreConnector>,
    backoff: Backoff,
    slot: Mutex<Slot>,
    connect_calls: AtomicU64,
}

impl StoreConnection {
    pub fn new(connector: Arc<dyn StoreConnector>, backoff: Backoff) -> Self {
        Self {
            connector,
            backoff,
            slot: Mutex::new(Slot::default()),
            connect_calls: AtomicU64::new(0),
        }
    }

    /// Connected store handle, joining or starting a connect attempt if needed.
    pub async fn get(&self) -> ConnectResult {
        if let Some(err) = self.cooling_down() {
            debug!(error = %err, "Redis connect cooling down, reusing last failure");
            return Err(err);
        }

        let attempt = self.current_attempt();
        let result = attempt
            .get_or_init(|| self.connect_with_retry())
            .await
            .clone();

        let mut slot = self.lock();
        match &result {
            Ok(_) => {
                slot.last_error = None;
                slot.failed_at = None;
            }
            Err(err) => {
                if slot
                    .attempt
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &attempt))
                {
                    slot.attempt = None;
                }
                slot.last_error = Some(err.clone());
                slot.failed_at = Some(Instant::now());
            }
        }

        result
    }

    /// Forget a connection that broke while in use.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        if let Some(attempt) = slot.attempt.take() {
            if matches!(attempt.get(), Some(Ok(_))) {
                warn!(redis_url = %self.connector.describe(), "Dropping broken Redis connection");
            } else {
                slot.attempt = Some(attempt);
            }
        }
    }

    /// Close the connection and reset to `Disconnected`.
    pub async fn shutdown(&self) {
        let attempt = {
            let mut slot = self.lock();
            slot.last_error = None;
            slot.failed_at = None;
            slot.attempt.take()
        };

        if let Some(Ok(store)) = attempt.as_ref().and_then(|a| a.get()) {
            match store.quit().await {
                Ok(()) => info!("Redis connection closed"),
                Err(e) => warn!(error = %e, "Error closing Redis connection"),
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        let slot = self.lock();
        match slot.attempt.as_ref().map(|a| a.get()) {
            None if slot.last_error.is_some() => ConnectionState::Failed,
            None => ConnectionState::Disconnected,
            Some(None) => ConnectionState::Connecting,
            Some(Some(Ok(_))) => ConnectionState::Connected,
            Some(Some(Err(_))) => ConnectionState::Failed,
        }
    }

    /// Total connect calls issued to the connector.
    pub fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<StoreError> {
        self.lock().last_error.clone()
    }

    pub fn target(&self) -> String {
        self.connector.describe()
    }

    /// The last failure, while no attempt is live and the cooldown has not passed.
    fn cooling_down(&self) -> Option<StoreError> {
        let slot = self.lock();
        if slot.attempt.is_some() {
            return None;
        }
        match slot.failed_at {
            Some(at) if at.elapsed() < self.backoff.cooldown => slot.last_error.clone(),
            _ => None,
        }
    }

    fn current_attempt(&self) -> Attempt {
        let mut slot = self.lock();
        slot.attempt
            .get_or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect_with_retry(&self) -> ConnectResult {
        let target = self.connector.describe();
        let mut retry = 0;

        loop {
            self.connect_calls.fetch_add(1, Ordering::Relaxed);

            let outcome = match timeout(self.backoff.connect_timeout, self.connector.connect()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Unavailable(format!(
                    "connect timed out after {:?}",
                    self.backoff.connect_timeout
                ))),
            };

            match outcome {
                Ok(store) => {
                    info!(redis_url = %target, attempts = retry + 1, "Redis connected");
                    return Ok(store);
                }
                Err(err) if !err.is_transient() => {
                    error!(redis_url = %target, error = %err, "Redis connection failed");
                    return Err(err);
                }
                Err(err) if retry >= self.backoff.retries => {
                    error!(
                        redis_url = %target,
                        error = %err,
                        attempts = retry + 1,
                        "Redis connection failed, retry budget exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff.delay(retry);
                    warn!(
                        redis_url = %target,
                        error = %err,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Redis connection attempt failed, retrying"
                    );
                    sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
