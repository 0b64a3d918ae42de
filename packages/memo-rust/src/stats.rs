//! Counters describing what a memo has done since it was opened.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of a memo's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Calls that had to run the computation.
    pub misses: u64,
    /// Computations that returned an error.
    pub compute_errors: u64,
    /// Results handed to the writer.
    pub enqueued: u64,
    /// Records the writer appended to the log.
    pub appended: u64,
    /// Records replayed from the log at startup.
    pub recovered: u64,
    /// Bytes of torn tail discarded at startup.
    pub truncated_bytes: u64,
}

/// Shared atomic counters behind [`MemoStats`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) compute_errors: AtomicU64,
    pub(crate) enqueued: AtomicU64,
    pub(crate) appended: AtomicU64,
    pub(crate) recovered: AtomicU64,
    pub(crate) truncated_bytes: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compute_errors: self.compute_errors.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            truncated_bytes: self.truncated_bytes.load(Ordering::Relaxed),
        }
    }
}
