//! Error types for opening, calling and closing a memo.
//!
//! A durability failure is recorded once as a [`WriteError`] and shared by
//! `Arc` with every caller that runs into it afterwards.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use memolog_core::CodecError;

/// Errors that prevent a [`Memo`](crate::Memo) from being constructed.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// A missing parent directory of the log file could not be created.
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The log file could not be opened or created.
    #[error("failed to open log {path}: {source}")]
    Open {
        /// The log file path.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading the log or repairing its tail failed. Corrupt data alone never
    /// produces this error.
    #[error("failed to recover log: {0}")]
    Recovery(#[from] CodecError),
    /// The blocking task running recovery panicked or was cancelled.
    #[error("recovery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A durability failure in the background writer.
///
/// Recorded once per memo and shared with every caller that observes it.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The codec refused the record, so nothing was written for it.
    #[error("failed to encode record: {0}")]
    Encode(#[source] CodecError),
    /// Writing or flushing the appended bytes failed.
    #[error("failed to append record: {0}")]
    Io(#[from] io::Error),
    /// Syncing the log when the writer shut down failed.
    #[error("failed to sync log: {0}")]
    Sync(#[source] io::Error),
}

/// Errors returned by [`Memo::call`](crate::Memo::call).
///
/// Apart from `Compute`, every variant carries the freshly computed value:
/// the computation succeeded, only its persistence did not.
#[derive(Debug)]
pub enum CallError<V, E> {
    /// The wrapped computation failed. Nothing was cached or persisted.
    Compute(E),
    /// The writer has failed; the value was not queued for persistence.
    Durability { value: V, source: Arc<WriteError> },
    /// The memo was cancelled before the value could be queued.
    Cancelled { value: V },
}

impl<V, E: fmt::Display> fmt::Display for CallError<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute(err) => write!(f, "computation failed: {err}"),
            Self::Durability { source, .. } => write!(f, "memo log is no longer durable: {source}"),
            Self::Cancelled { .. } => f.write_str("memo cancelled before the result could be queued"),
        }
    }
}

impl<V, E> std::error::Error for CallError<V, E>
where
    V: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compute(err) => Some(err),
            Self::Durability { source, .. } => Some(source.as_ref()),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<V, E> CallError<V, E> {
    /// The computed value, if the computation itself succeeded.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Compute(_) => None,
            Self::Durability { value, .. } | Self::Cancelled { value } => Some(value),
        }
    }

    /// Consumes the error, returning the computed value if there is one.
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Compute(_) => None,
            Self::Durability { value, .. } | Self::Cancelled { value } => Some(value),
        }
    }

    /// Returns the computation's own error, if that is what failed.
    pub fn into_compute(self) -> Option<E> {
        match self {
            Self::Compute(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors from [`Memo::close`](crate::Memo::close).
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("durability writer did not finish: {0}")]
    Writer(#[from] tokio::task::JoinError),
}
