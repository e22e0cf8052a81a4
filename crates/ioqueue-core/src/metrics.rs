//! Atomic counters for queue observability.
//!
//! All counters use relaxed ordering; they are diagnostic, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-queue operation counters.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Requests accepted into the table.
    pub submitted: AtomicU64,
    /// Requests consumed by `wait`.
    pub completed: AtomicU64,
    /// Cancellations applied to live requests.
    pub cancelled: AtomicU64,
    /// Requests that finished with a negative result.
    pub failed: AtomicU64,
    /// Read syscalls issued (one per chunk).
    pub read_chunks: AtomicU64,
    /// Partial reads put back on the queue for their next chunk.
    pub split_continuations: AtomicU64,
    /// Dispatches chosen by deadline.
    pub deadline_dispatches: AtomicU64,
    /// Dispatches chosen by FIFO order.
    pub fifo_dispatches: AtomicU64,
    /// Requests executed inline because no worker could be started.
    pub sync_fallbacks: AtomicU64,
    /// Request table growth steps.
    pub table_grows: AtomicU64,
    /// Request table shrink steps.
    pub table_shrinks: AtomicU64,
}

impl QueueMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            read_chunks: AtomicU64::new(0),
            split_continuations: AtomicU64::new(0),
            deadline_dispatches: AtomicU64::new(0),
            fifo_dispatches: AtomicU64::new(0),
            sync_fallbacks: AtomicU64::new(0),
            table_grows: AtomicU64::new(0),
            table_shrinks: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: Self::get(&self.submitted),
            completed: Self::get(&self.completed),
            cancelled: Self::get(&self.cancelled),
            failed: Self::get(&self.failed),
            read_chunks: Self::get(&self.read_chunks),
            split_continuations: Self::get(&self.split_continuations),
            deadline_dispatches: Self::get(&self.deadline_dispatches),
            fifo_dispatches: Self::get(&self.fifo_dispatches),
            sync_fallbacks: Self::get(&self.sync_fallbacks),
            table_grows: Self::get(&self.table_grows),
            table_shrinks: Self::get(&self.table_shrinks),
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub read_chunks: u64,
    pub split_continuations: u64,
    pub deadline_dispatches: u64,
    pub fifo_dispatches: u64,
    pub sync_fallbacks: u64,
    pub table_grows: u64,
    pub table_shrinks: u64,
}
