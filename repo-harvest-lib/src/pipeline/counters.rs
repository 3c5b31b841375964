use core::fmt::{Display, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};

/// Per-stage counters shared by every worker of a run.
#[derive(Debug, Default)]
pub struct StageCounters {
    processed: AtomicU64,
    enriched: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    live_calls: AtomicU64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                let _ = self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl StageCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    bump! {
        processed => processed,
        enriched => enriched,
        skipped => skipped,
        failed => failed,
        cache_hit => cache_hits,
        live_call => live_calls,
    }

    /// Record one lookup, counting it as a hit or a live call.
    pub fn lookup(&self, cached: bool) {
        if cached { self.cache_hit() } else { self.live_call() }
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            enriched: self.enriched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            live_calls: self.live_calls.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StageCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub processed: u64,
    pub enriched: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub live_calls: u64,
}

impl Display for CounterSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "processed {}, enriched {}, skipped {}, failed {}, cache hits {}, live calls {}",
            self.processed, self.enriched, self.skipped, self.failed, self.cache_hits, self.live_calls
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(StageCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counters);
                tokio::spawn(async move {
                    for i in 0..100 {
                        c.processed();
                        c.lookup(i % 2 == 0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        let snap = counters.snapshot();
        assert_eq!(snap.processed, 800);
        assert_eq!(snap.cache_hits, 400);
        assert_eq!(snap.live_calls, 400);
    }

    #[test]
    fn snapshot_display() {
        let counters = StageCounters::new();
        counters.enriched();
        counters.failed();
        assert_eq!(
            counters.snapshot().to_string(),
            "processed 0, enriched 1, skipped 0, failed 1, cache hits 0, live calls 0"
        );
    }
}
