//! Best-effort progress notifications
//!
//! The observer (typically a UI) may be absent or torn down mid-batch.
//! Every notification goes through a bounded timeout and its result is
//! discarded; delivery is not guaranteed and must never affect batch
//! completion or outcome correctness.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::BatchResult;

/// Default bound on a single notification attempt.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// A progress or error notification emitted during a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A coarse phase transition ("Reading recipients", ...).
    Phase { message: String, total: usize },

    /// One send attempt finished, success or failure.
    Delivery {
        current: usize,
        total: usize,
        recipient: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The whole batch ran to completion.
    Completed { result: BatchResult },

    /// The campaign aborted with a top-level error.
    Failed { error: String },
}

/// The observer could not take the notification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("observer unavailable: {0}")]
pub struct NotifyError(pub String);

/// Sink for progress events. Implementations should return quickly; slow
/// observers are cut off by the reporter's timeout.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn notify(&self, event: ProgressEvent) -> Result<(), NotifyError>;
}

/// Fire-and-forget wrapper around a [`ProgressObserver`].
#[derive(Clone)]
pub struct Reporter {
    observer: Option<Arc<dyn ProgressObserver>>,
    timeout: Duration,
}

impl Reporter {
    pub fn new(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            observer: Some(observer),
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(observer: Arc<dyn ProgressObserver>, timeout: Duration) -> Self {
        Self {
            observer: Some(observer),
            timeout,
        }
    }

    /// A reporter that drops every event.
    pub fn disabled() -> Self {
        Self {
            observer: None,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Deliver an event, bounded by the timeout. Failures and timeouts are
    /// swallowed.
    pub async fn publish(&self, event: ProgressEvent) {
        let Some(observer) = &self.observer else {
            return;
        };
        match tokio::time::timeout(self.timeout, observer.notify(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "progress notification dropped"),
            Err(_) => debug!("progress notification timed out"),
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("enabled", &self.observer.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        events: Mutex<Vec<ProgressEvent>>,
    }

    #[async_trait]
    impl ProgressObserver for Recording {
        async fn notify(&self, event: ProgressEvent) -> Result<(), NotifyError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Stuck;

    #[async_trait]
    impl ProgressObserver for Stuck {
        async fn notify(&self, _event: ProgressEvent) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_events_reach_the_observer() {
        let observer = Arc::new(Recording {
            events: Mutex::new(Vec::new()),
        });
        let reporter = Reporter::new(observer.clone());

        reporter
            .publish(ProgressEvent::Phase {
                message: "Reading recipients".into(),
                total: 0,
            })
            .await;

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_observer_is_cut_off() {
        let reporter = Reporter::with_timeout(Arc::new(Stuck), Duration::from_millis(50));

        // Must return despite the observer never completing.
        reporter
            .publish(ProgressEvent::Failed {
                error: "boom".into(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_failing_observer_is_swallowed() {
        struct Failing;

        #[async_trait]
        impl ProgressObserver for Failing {
            async fn notify(&self, _event: ProgressEvent) -> Result<(), NotifyError> {
                Err(NotifyError("observer gone".into()))
            }
        }

        let reporter = Reporter::new(Arc::new(Failing));
        reporter
            .publish(ProgressEvent::Completed {
                result: BatchResult {
                    total: 0,
                    successful: 0,
                    failed: 0,
                },
            })
            .await;
    }

    #[tokio::test]
    async fn test_disabled_reporter_is_a_noop() {
        Reporter::disabled()
            .publish(ProgressEvent::Phase {
                message: "ignored".into(),
                total: 0,
            })
            .await;
    }
}
