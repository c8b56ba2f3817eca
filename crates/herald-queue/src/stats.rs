//! Queue counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for one queue
#[derive(Debug, Default)]
pub(crate) struct QueueStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed_attempts: AtomicU64,
    retries: AtomicU64,
    abandoned: AtomicU64,
    rejected: AtomicU64,
    drain_restarts: AtomicU64,
}

impl QueueStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// A failed attempt; `retrying` is false when the operation is abandoned
    pub fn record_failure(&self, retrying: bool) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        if retrying {
            self.retries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self, count: u64) {
        self.rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_drain_restart(&self) {
        self.drain_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            drain_restarts: self.drain_restarts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a queue's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatsSnapshot {
    /// Operations accepted by `submit`
    pub submitted: u64,
    /// Operations that eventually succeeded
    pub succeeded: u64,
    /// Attempts that returned an error, timed out or panicked
    pub failed_attempts: u64,
    /// Failed attempts that were re-queued
    pub retries: u64,
    /// Operations given up on after exhausting their attempts
    pub abandoned: u64,
    /// Operations refused or dropped because of shutdown
    pub rejected: u64,
    /// Times the drain task had to be restarted after stopping abnormally
    pub drain_restarts: u64,
}

impl QueueStatsSnapshot {
    /// Operations that have neither completed nor been given up on
    pub fn outstanding(&self) -> u64 {
        self.submitted
            .saturating_sub(self.succeeded + self.abandoned + self.rejected)
    }

    /// Share of failed attempts among all attempts made
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.succeeded + self.failed_attempts;
        if attempts == 0 {
            0.0
        } else {
            self.failed_attempts as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = QueueStats::default();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_failure(true);
        stats.record_success();
        stats.record_failure(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.failed_attempts, 2);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.abandoned, 1);
        assert_eq!(snapshot.outstanding(), 0);
        assert!((snapshot.failure_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_failure_rate() {
        assert_eq!(QueueStatsSnapshot::default().failure_rate(), 0.0);
    }
}
