//! Source-scoped request spacing.
//!
//! One [`RateGate`] exists per source and is cloned into every fetch task of
//! that source. Clones share the last-call timestamp, so the minimum interval
//! holds across concurrent accounts and categories, not per account.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateGate {
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Gate that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn from_millis(ms: Option<u64>) -> Self {
        Self::new(Duration::from_millis(ms.unwrap_or(0)))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until at least `min_interval` has passed since the previous call
    /// through any clone of this gate, then record the current call.
    ///
    /// The lock is held across the sleep so waiters are admitted one at a time.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
