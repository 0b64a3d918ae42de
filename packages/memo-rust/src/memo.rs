//! The memoizing wrapper.
//!
//! [`Memo`] puts an in-memory cache in front of an async computation and
//! mirrors every new result into an append-only log, so results survive
//! restarts. Control flow for [`Memo::call`]:
//!
//! 1. Cache hit: return the cached value. No queue or log interaction.
//! 2. Miss: run the computation. Its errors are returned unchanged and
//!    nothing is cached.
//! 3. Queue the new record for the durability writer and return the value
//!    without waiting for the append. Queueing blocks while the queue is full
//!    and gives up as soon as the memo is cancelled.
//!
//! Two concurrent misses on the same key both run the computation and both
//! queue a record. The writer applies them in arrival order, so the last one
//! wins in the map and in the log.

use std::fs::File;
use std::future::Future;
use std::hash::Hash;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use memolog_core::{LogResource, Record, RecordCodec};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MemoConfig;
use crate::error::{CallError, CloseError, OpenError, WriteError};
use crate::recovery;
use crate::state::{CacheState, FailureFlag};
use crate::stats::{Counters, MemoStats};
use crate::writer::DurabilityWriter;

/// A persistent, memoized version of the computation `F`.
///
/// `F` is any `Fn(K) -> impl Future<Output = Result<V, E>>`. Share a memo
/// between tasks with `Arc`.
///
/// # Shutdown
///
/// Always finish with [`close`](Self::close). It is the only way to wait for
/// queued records to reach the log and to see a failure of the final sync.
/// Dropping a memo closes its queue too, but nothing joins the writer: it
/// drains in the background, a late failure goes unreported, and a warning
/// is logged.
pub struct Memo<K, V, F, R> {
    compute: F,
    cache: Arc<CacheState<K, V>>,
    failure: Arc<FailureFlag>,
    tx: mpsc::Sender<Record<K, V>>,
    writer: JoinHandle<R>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    close_guard: CloseGuard,
}

/// Warns when a memo is dropped without going through [`Memo::close`].
struct CloseGuard {
    armed: bool,
}

impl CloseGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                "memo dropped without close; its writer drains unobserved and a late write failure is lost"
            );
        }
    }
}

/// What [`Memo::close`] hands back.
#[derive(Debug)]
pub struct Closed<R> {
    /// The log resource, positioned after the last appended record.
    pub resource: R,
    /// The durability failure, if the writer hit one.
    pub failure: Option<Arc<WriteError>>,
    /// Final counters.
    pub stats: MemoStats,
}

impl<K, V, F, R> Memo<K, V, F, R>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    R: LogResource,
{
    /// Opens a memo over an already-open log resource.
    ///
    /// The resource is replayed from its current position to rebuild the
    /// cache, and a torn tail left by a crash is truncated. The memo is
    /// cancelled when `cancel` is.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Recovery`] if the resource cannot be read,
    /// seeked or truncated.
    pub async fn open<C, Fut, E>(
        resource: R,
        codec: C,
        config: MemoConfig,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<Self, OpenError>
    where
        C: RecordCodec<K, V>,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (resource, codec, recovered) = tokio::task::spawn_blocking(move || {
            let mut resource = resource;
            let recovered = recovery::recover::<K, V, R, C>(&mut resource, &codec)?;
            Ok::<_, OpenError>((resource, codec, recovered))
        })
        .await??;

        tracing::info!(
            records = recovered.records,
            entries = recovered.entries.len(),
            offset = recovered.end_offset,
            truncated_bytes = recovered.truncated_bytes,
            "recovered memo log"
        );

        let counters = Arc::new(Counters::default());
        counters.recovered.store(recovered.records, Ordering::Relaxed);
        counters
            .truncated_bytes
            .store(recovered.truncated_bytes, Ordering::Relaxed);

        let cache = Arc::new(CacheState::from_map(recovered.entries));
        let failure = Arc::new(FailureFlag::default());
        let cancel = cancel.child_token();
        let (tx, rx) = mpsc::channel(config.effective_queue_capacity());

        let writer = DurabilityWriter {
            resource,
            codec,
            cache: Arc::clone(&cache),
            failure: Arc::clone(&failure),
            cancel: cancel.clone(),
            counters: Arc::clone(&counters),
            flush_each_record: config.flush_each_record,
            sync_on_close: config.sync_on_close,
        }
        .start(rx);

        Ok(Self {
            compute,
            cache,
            failure,
            tx,
            writer,
            cancel,
            counters,
            close_guard: CloseGuard { armed: true },
        })
    }

    /// Returns the value for `key`, computing and persisting it on a miss.
    ///
    /// The result is returned as soon as it is queued; it reaches the log
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// - [`CallError::Compute`] with the computation's own error.
    /// - [`CallError::Durability`] if the writer has failed; carries the
    ///   computed value and the recorded write error.
    /// - [`CallError::Cancelled`] if the memo was cancelled without a write
    ///   error; carries the computed value.
    pub async fn call<Fut, E>(&self, key: K) -> Result<V, CallError<V, E>>
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cache.lookup(&key) {
            Counters::incr(&self.counters.hits);
            return Ok(value);
        }
        Counters::incr(&self.counters.misses);

        let value = match (self.compute)(key.clone()).await {
            Ok(value) => value,
            Err(err) => {
                Counters::incr(&self.counters.compute_errors);
                return Err(CallError::Compute(err));
            }
        };

        // Reserve a slot instead of sending directly so that the value is
        // still ours if cancellation wins.
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(self.interrupted(value)),
            permit = self.tx.reserve() => permit,
        };
        let Ok(permit) = permit else {
            return Err(self.interrupted(value));
        };

        permit.send(Record::new(key, value.clone()));
        Counters::incr(&self.counters.enqueued);
        Ok(value)
    }

    fn interrupted<E>(&self, value: V) -> CallError<V, E> {
        match self.failure.get() {
            Some(source) => CallError::Durability { value, source },
            None => CallError::Cancelled { value },
        }
    }

    /// Returns the cached value for `key` without ever computing it.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cache.lookup(key)
    }

    /// Number of keys in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The durability error recorded by the writer, if any.
    pub fn failure(&self) -> Option<Arc<WriteError>> {
        self.failure.get()
    }

    /// Returns `true` once the memo has been cancelled, either by the caller
    /// or because the writer failed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the memo. Pending and future queue attempts give up; the
    /// writer still drains what is already queued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the memo is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Snapshot of the memo's counters.
    pub fn stats(&self) -> MemoStats {
        self.counters.snapshot()
    }

    /// Closes the queue, waits for the writer to drain it and returns the
    /// log resource.
    ///
    /// # Errors
    ///
    /// Returns [`CloseError::Writer`] if the writer task panicked.
    pub async fn close(self) -> Result<Closed<R>, CloseError> {
        let Self {
            tx,
            writer,
            failure,
            counters,
            close_guard,
            ..
        } = self;

        close_guard.disarm();
        drop(tx);
        let resource = writer.await?;
        let failure = failure.get();
        tracing::debug!(failed = failure.is_some(), "memo closed");

        Ok(Closed {
            resource,
            failure,
            stats: counters.snapshot(),
        })
    }
}

impl<K, V, F> Memo<K, V, F, File>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Opens a memo whose log lives in the file at `path`.
    ///
    /// Missing parent directories are created when
    /// [`MemoConfig::create_dirs`] is set, and the file itself is created if
    /// absent. Otherwise behaves like [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::CreateDir`] or [`OpenError::Open`] if the
    /// directory or file cannot be created or opened, and
    /// [`OpenError::Recovery`] if replaying the file fails.
    pub async fn open_path<C, Fut, E>(
        path: impl AsRef<Path>,
        codec: C,
        config: MemoConfig,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<Self, OpenError>
    where
        C: RecordCodec<K, V>,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let path = path.as_ref();

        if config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| OpenError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|source| OpenError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "opened memo log file");
        Self::open(file.into_std().await, codec, config, cancel, compute).await
    }
}
