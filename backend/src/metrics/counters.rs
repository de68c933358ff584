use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default, Debug)]
pub struct Counters {
    pub cycles_run: Arc<AtomicU64>,
    pub cycles_failed: Arc<AtomicU64>,

    pub pools_tracked: Arc<AtomicU64>,
    pub snapshot_batches_empty: Arc<AtomicU64>,

    pub backfills: Arc<AtomicU64>,
    pub backfills_empty: Arc<AtomicU64>,

    pub patterns_emitted: Arc<AtomicU64>,
    pub notify_failures: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`], convenient for logging and tests.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub pools_tracked: u64,
    pub snapshot_batches_empty: u64,
    pub backfills: u64,
    pub backfills_empty: u64,
    pub patterns_emitted: u64,
    pub notify_failures: u64,
}

pub fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            cycles_run: get(&self.cycles_run),
            cycles_failed: get(&self.cycles_failed),
            pools_tracked: get(&self.pools_tracked),
            snapshot_batches_empty: get(&self.snapshot_batches_empty),
            backfills: get(&self.backfills),
            backfills_empty: get(&self.backfills_empty),
            patterns_emitted: get(&self.patterns_emitted),
            notify_failures: get(&self.notify_failures),
        }
    }
}
