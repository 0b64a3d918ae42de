//! The durability writer: the single consumer of the pending queue.
//!
//! The writer owns the log resource, the codec and every mutation of the
//! cache map. It runs on tokio's blocking pool because appends are plain
//! synchronous I/O. For each queued record it updates the map, then encodes
//! and appends the record. The first failure is recorded in the
//! [`FailureFlag`], the memo's cancellation token is fired, and the writer
//! stops for good.

use std::hash::Hash;
use std::io::Write;
use std::sync::Arc;

use memolog_core::{LogResource, Record, RecordCodec};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WriteError;
use crate::state::{CacheState, FailureFlag};
use crate::stats::Counters;

pub(crate) struct DurabilityWriter<K, V, R, C> {
    pub(crate) resource: R,
    pub(crate) codec: C,
    pub(crate) cache: Arc<CacheState<K, V>>,
    pub(crate) failure: Arc<FailureFlag>,
    pub(crate) cancel: CancellationToken,
    pub(crate) counters: Arc<Counters>,
    pub(crate) flush_each_record: bool,
    pub(crate) sync_on_close: bool,
}

impl<K, V, R, C> DurabilityWriter<K, V, R, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    R: LogResource,
    C: RecordCodec<K, V>,
{
    /// Starts draining `rx` on the blocking pool.
    ///
    /// The returned handle resolves to the resource once the queue has been
    /// closed and drained, or once an append has failed.
    pub(crate) fn start(self, rx: mpsc::Receiver<Record<K, V>>) -> JoinHandle<R> {
        tokio::task::spawn_blocking(move || self.run(rx))
    }

    fn run(mut self, mut rx: mpsc::Receiver<Record<K, V>>) -> R {
        let mut buf = Vec::new();

        while let Some(record) = rx.blocking_recv() {
            if let Err(err) = self.append(&record, &mut buf) {
                let err = self.failure.set(err);
                tracing::error!(error = %err, "memo log append failed; persistence disabled");
                self.cancel.cancel();
                // Dropping `rx` here closes the queue for any producer that
                // got past the cancellation check.
                return self.resource;
            }
        }

        if self.sync_on_close {
            if let Err(err) = self.resource.sync() {
                let err = self.failure.set(WriteError::Sync(err));
                tracing::error!(error = %err, "failed to sync memo log on close");
            }
        }
        tracing::debug!("memo writer drained and stopped");
        self.resource
    }

    fn append(&mut self, record: &Record<K, V>, buf: &mut Vec<u8>) -> Result<(), WriteError> {
        self.cache.insert(record.key.clone(), record.value.clone());

        buf.clear();
        self.codec.encode(record, buf).map_err(WriteError::Encode)?;
        self.resource.write_all(buf.as_slice())?;
        if self.flush_each_record {
            self.resource.flush()?;
        }

        Counters::incr(&self.counters.appended);
        Ok(())
    }
}
