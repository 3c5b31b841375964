use core::time::Duration;
use strum::{Display, EnumString};
use tokio::sync::Mutex;
use tokio::time::Instant;

const LOG_TARGET: &str = "   gateway";

/// Independent quota buckets of the hosting API.
///
/// Search has a much smaller per-minute budget than the other endpoints, so calls against it
/// are paced separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum QuotaPool {
    Core,
    Search,
}

/// Enforces a minimum gap between consecutive live calls in one pool.
#[derive(Debug)]
pub(crate) struct PoolThrottle {
    pool: QuotaPool,
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl PoolThrottle {
    pub(crate) fn new(pool: QuotaPool, min_interval: Duration) -> Self {
        Self {
            pool,
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until this pool may issue its next call, then reserve the following slot.
    pub(crate) async fn wait_turn(&self) {
        let mut next = self.next_slot.lock().await;
        if *next > Instant::now() {
            tokio::time::sleep_until(*next).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// Hold every call in this pool until at least `delay` from now.
    pub(crate) async fn pause_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut next = self.next_slot.lock().await;
        if until > *next {
            log::info!(target: LOG_TARGET, "Pausing {} calls for {}s", self.pool, delay.as_secs());
            *next = until;
        }
    }
}
