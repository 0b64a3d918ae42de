//! Configuration for a [`Memo`](crate::Memo) instance.

use std::num::NonZeroUsize;

/// Tuning knobs for the pending queue and the durability writer.
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// Capacity of the bounded queue between callers and the writer.
    /// Callers block once this many entries are waiting. Values below 1 are
    /// treated as 1.
    pub queue_capacity: usize,
    /// Flush the resource after every appended record.
    pub flush_each_record: bool,
    /// Sync the resource when the writer exits after the queue is closed.
    pub sync_on_close: bool,
    /// Create missing parent directories when opening a log by path.
    pub create_dirs: bool,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            flush_each_record: true,
            sync_on_close: true,
            create_dirs: true,
        }
    }
}

impl MemoConfig {
    /// Sets the pending queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets whether every append is followed by a flush.
    #[must_use]
    pub fn with_flush_each_record(mut self, flush: bool) -> Self {
        self.flush_each_record = flush;
        self
    }

    /// Sets whether the resource is synced when the writer exits cleanly.
    #[must_use]
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Sets whether missing parent directories are created.
    #[must_use]
    pub fn with_create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    /// The queue capacity actually used, never zero.
    #[must_use]
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// One queue slot per available core, falling back to 1 if unknown.
fn default_queue_capacity() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
