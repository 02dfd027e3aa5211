//! Process-lifetime delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every task of one worker process.
#[derive(Debug, Default)]
pub struct WorkerStats {
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    subscriptions_removed: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub retried: u64,
    pub failed: u64,
    pub subscriptions_removed: u64,
}

impl WorkerStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscription_removed(&self) {
        self.subscriptions_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            subscriptions_removed: self.subscriptions_removed.load(Ordering::Relaxed),
        }
    }
}
