//! Daily-cap and inter-send spacing enforcement
//!
//! The limiter owns the only shared mutable state in the pipeline: how many
//! sends happened today and when the last one went out. The daily counter is
//! persisted through a [`LimitStore`] and reset exactly once when the stored
//! date no longer matches the current date. The inter-send spacing is
//! session-local and is not enforced across restarts mid-interval.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default daily send cap (Gmail per-account limit).
pub const DEFAULT_MAX_PER_DAY: u32 = 500;

/// Default minimum spacing between two sends.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(3000);

/// Policy knobs for the limiter. These are configuration, not business
/// logic; see `OutreachConfig`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_per_day: u32,
    pub min_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_per_day: DEFAULT_MAX_PER_DAY,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// The durable slice of limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub sent_today: u32,
    pub last_reset_date: NaiveDate,
}

/// Durable key/value storage failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),
}

/// Durable storage for the daily counter. Loads and saves are idempotent
/// and may be retried freely; the in-memory counter is the source of truth
/// within a session.
#[async_trait]
pub trait LimitStore: Send + Sync {
    async fn load(&self) -> Result<Option<RateLimitSnapshot>, StoreError>;
    async fn save(&self, snapshot: &RateLimitSnapshot) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<RateLimitSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(snapshot: RateLimitSnapshot) -> Self {
        Self {
            inner: Mutex::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl LimitStore for MemoryStore {
    async fn load(&self) -> Result<Option<RateLimitSnapshot>, StoreError> {
        Ok(*self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn save(&self, snapshot: &RateLimitSnapshot) -> Result<(), StoreError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(*snapshot);
        Ok(())
    }
}

/// JSON-file-backed store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LimitStore for JsonFileStore {
    async fn load(&self) -> Result<Option<RateLimitSnapshot>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read(e.to_string())),
        };
        let snapshot =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &RateLimitSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }
        let bytes =
            serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Write(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

#[derive(Debug)]
struct LimiterState {
    sent_today: u32,
    last_reset_date: NaiveDate,
    last_send: Option<Instant>,
}

/// Daily-cap + minimum-interval rate limiter.
///
/// Explicitly constructed and passed to the orchestrator; callers must
/// serialize batch invocations sharing one limiter.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Box<dyn LimitStore>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, store: impl LimitStore + 'static) -> Self {
        Self {
            policy,
            store: Box::new(store),
            state: Mutex::new(LimiterState {
                sent_today: 0,
                last_reset_date: Local::now().date_naive(),
                last_send: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the persisted counter, resetting it once if the stored date
    /// differs from today. A storage read error fails open into a
    /// fresh-day state: sending is never blocked by the store, at the cost
    /// of daily-cap continuity across that restart.
    pub async fn initialize(&self) {
        let today = Local::now().date_naive();

        let loaded = match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "rate limit state unavailable, starting fresh day");
                let mut state = self.state();
                state.sent_today = 0;
                state.last_reset_date = today;
                return;
            }
        };

        let snapshot = match loaded {
            Some(snapshot) if snapshot.last_reset_date == today => {
                let mut state = self.state();
                state.sent_today = snapshot.sent_today;
                state.last_reset_date = snapshot.last_reset_date;
                return;
            }
            other => {
                if other.is_some() {
                    debug!("new day, resetting daily send counter");
                }
                let mut state = self.state();
                state.sent_today = 0;
                state.last_reset_date = today;
                RateLimitSnapshot {
                    sent_today: 0,
                    last_reset_date: today,
                }
            }
        };

        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist daily counter reset");
        }
    }

    /// Whether another send is allowed under the daily cap.
    pub fn can_send(&self) -> bool {
        let state = self.state();
        state.sent_today < self.policy.max_per_day
    }

    /// Time remaining until the minimum inter-send interval has elapsed.
    /// Zero when already elapsed or when nothing was sent this session.
    pub fn compute_delay(&self) -> Duration {
        let state = self.state();
        match state.last_send {
            None => Duration::ZERO,
            Some(at) => (at + self.policy.min_interval).saturating_duration_since(Instant::now()),
        }
    }

    /// Suspend until the inter-send interval has elapsed. This is the
    /// single serialization point keeping sends at least `min_interval`
    /// apart within one process lifetime.
    pub async fn wait(&self) {
        let delay = self.compute_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Count one send and persist the daily counter. Persistence failure
    /// is logged and swallowed; the in-memory counter keeps governing the
    /// session.
    pub async fn record_send(&self) {
        let snapshot = {
            let mut state = self.state();
            state.sent_today += 1;
            state.last_send = Some(Instant::now());
            RateLimitSnapshot {
                sent_today: state.sent_today,
                last_reset_date: state.last_reset_date,
            }
        };

        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "failed to persist rate limit state");
        }
    }

    /// Sends left under the daily cap.
    pub fn remaining(&self) -> u32 {
        let state = self.state();
        self.policy.max_per_day.saturating_sub(state.sent_today)
    }

    pub fn sent_today(&self) -> u32 {
        self.state().sent_today
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("sent_today", &state.sent_today)
            .field("last_reset_date", &state.last_reset_date)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limiter_with(max_per_day: u32, store: impl LimitStore + 'static) -> RateLimiter {
        RateLimiter::new(
            RateLimitPolicy {
                max_per_day,
                min_interval: Duration::from_millis(3000),
            },
            store,
        )
    }

    #[tokio::test]
    async fn test_cap_boundary() {
        let limiter = limiter_with(2, MemoryStore::new());
        limiter.initialize().await;

        assert!(limiter.can_send());
        limiter.record_send().await;
        assert!(limiter.can_send());
        assert_eq!(limiter.remaining(), 1);

        limiter.record_send().await;
        assert!(!limiter.can_send());
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_stale_date_resets_counter() {
        let stale = RateLimitSnapshot {
            sent_today: 499,
            last_reset_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        };
        let limiter = limiter_with(500, MemoryStore::seeded(stale));
        limiter.initialize().await;

        assert_eq!(limiter.sent_today(), 0);
        assert_eq!(limiter.remaining(), 500);
    }

    #[tokio::test]
    async fn test_same_day_counter_is_kept() {
        let snapshot = RateLimitSnapshot {
            sent_today: 42,
            last_reset_date: Local::now().date_naive(),
        };
        let limiter = limiter_with(500, MemoryStore::seeded(snapshot));
        limiter.initialize().await;

        assert_eq!(limiter.sent_today(), 42);
        assert_eq!(limiter.remaining(), 458);
    }

    #[tokio::test]
    async fn test_reset_is_persisted() {
        let store = std::sync::Arc::new(MemoryStore::seeded(RateLimitSnapshot {
            sent_today: 10,
            last_reset_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        }));

        struct Shared(std::sync::Arc<MemoryStore>);

        #[async_trait]
        impl LimitStore for Shared {
            async fn load(&self) -> Result<Option<RateLimitSnapshot>, StoreError> {
                self.0.load().await
            }
            async fn save(&self, snapshot: &RateLimitSnapshot) -> Result<(), StoreError> {
                self.0.save(snapshot).await
            }
        }

        let limiter = limiter_with(500, Shared(store.clone()));
        limiter.initialize().await;

        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted.sent_today, 0);
        assert_eq!(persisted.last_reset_date, Local::now().date_naive());
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        struct BrokenStore;

        #[async_trait]
        impl LimitStore for BrokenStore {
            async fn load(&self) -> Result<Option<RateLimitSnapshot>, StoreError> {
                Err(StoreError::Read("disk on fire".into()))
            }
            async fn save(&self, _: &RateLimitSnapshot) -> Result<(), StoreError> {
                Err(StoreError::Write("disk still on fire".into()))
            }
        }

        let limiter = limiter_with(500, BrokenStore);
        limiter.initialize().await;
        assert!(limiter.can_send());

        // record_send swallows persistence failure
        limiter.record_send().await;
        assert_eq!(limiter.sent_today(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compute_delay_and_wait() {
        let limiter = limiter_with(500, MemoryStore::new());
        limiter.initialize().await;

        // No prior send this session
        assert_eq!(limiter.compute_delay(), Duration::ZERO);

        limiter.record_send().await;
        assert_eq!(limiter.compute_delay(), Duration::from_millis(3000));

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(limiter.compute_delay(), Duration::from_millis(2000));

        // wait() sleeps out the remainder (auto-advanced under the paused clock)
        let before = Instant::now();
        limiter.wait().await;
        assert!(Instant::now() - before >= Duration::from_millis(2000));
        assert_eq!(limiter.compute_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_json_file_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!("outreach-limiter-{}", std::process::id()));
        let store = JsonFileStore::new(dir.join("rate_limit.json"));

        assert_eq!(store.load().await.unwrap(), None);

        let snapshot = RateLimitSnapshot {
            sent_today: 7,
            last_reset_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
        };
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
