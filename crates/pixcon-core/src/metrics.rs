//! Process-wide atomic counters for comparison activity.
//!
//! Counters are bumped at the call site. [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{BackendFailure, MetricRecord};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    comparisons_started: AtomicU64,
    comparisons_completed: AtomicU64,
    comparisons_failed: AtomicU64,
    backend_successes: AtomicU64,
    backend_failures: AtomicU64,
    backend_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            comparisons_started: AtomicU64::new(0),
            comparisons_completed: AtomicU64::new(0),
            comparisons_failed: AtomicU64::new(0),
            backend_successes: AtomicU64::new(0),
            backend_failures: AtomicU64::new(0),
            backend_timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_comparisons_started(&self) {
        self.comparisons_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_comparisons_completed(&self) {
        self.comparisons_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_comparisons_failed(&self) {
        self.comparisons_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one backend outcome. Unavailable backends were never run and
    /// are not counted.
    pub fn record_backend(&self, record: &MetricRecord) {
        match &record.failure {
            None => {
                self.backend_successes.fetch_add(1, Ordering::Relaxed);
            }
            Some(BackendFailure::Unavailable { .. }) => {}
            Some(BackendFailure::Timeout { .. }) => {
                self.backend_timeouts.fetch_add(1, Ordering::Relaxed);
                self.backend_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.backend_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        tracing::trace!(metric = "backend", backend = %record.backend, "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            comparisons_started = self.comparisons_started(),
            comparisons_completed = self.comparisons_completed(),
            comparisons_failed = self.comparisons_failed(),
            backend_successes = self.backend_successes(),
            backend_failures = self.backend_failures(),
            backend_timeouts = self.backend_timeouts(),
        );
    }

    pub fn comparisons_started(&self) -> u64 {
        self.comparisons_started.load(Ordering::Relaxed)
    }

    pub fn comparisons_completed(&self) -> u64 {
        self.comparisons_completed.load(Ordering::Relaxed)
    }

    pub fn comparisons_failed(&self) -> u64 {
        self.comparisons_failed.load(Ordering::Relaxed)
    }

    pub fn backend_successes(&self) -> u64 {
        self.backend_successes.load(Ordering::Relaxed)
    }

    pub fn backend_failures(&self) -> u64 {
        self.backend_failures.load(Ordering::Relaxed)
    }

    /// Timeouts are also counted in [`backend_failures`](Self::backend_failures).
    pub fn backend_timeouts(&self) -> u64 {
        self.backend_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.comparisons_started,
            &self.comparisons_completed,
            &self.comparisons_failed,
            &self.backend_successes,
            &self.backend_failures,
            &self.backend_timeouts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
