//! Registry counters
//!
//! Updated with relaxed atomics outside the holder locks; a snapshot may be
//! momentarily out of step with the holders.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RegistryMetrics {
    live: AtomicU64,
    created: AtomicU64,
    invalidated: AtomicU64,
    expired: AtomicU64,
    disposer_failures: AtomicU64,
}

/// Point-in-time copy of the registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryMetricsSnapshot {
    pub live: u64,
    pub created: u64,
    pub invalidated: u64,
    pub expired: u64,
    pub disposer_failures: u64,
}

impl RegistryMetrics {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidated(&self, count: usize) {
        self.invalidated.fetch_add(count as u64, Ordering::Relaxed);
        self.decrement_live(count);
    }

    pub(crate) fn record_expired(&self, count: usize) {
        self.expired.fetch_add(count as u64, Ordering::Relaxed);
        self.decrement_live(count);
    }

    pub(crate) fn record_disposer_failure(&self) {
        self.disposer_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_live(&self, count: usize) {
        let _ = self
            .live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                Some(live.saturating_sub(count as u64))
            });
    }

    pub fn snapshot(&self) -> RegistryMetricsSnapshot {
        RegistryMetricsSnapshot {
            live: self.live.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            disposer_failures: self.disposer_failures.load(Ordering::Relaxed),
        }
    }
}
