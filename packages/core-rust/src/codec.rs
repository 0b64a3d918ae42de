//! Pluggable wire format for memo log records.
//!
//! A [`RecordCodec`] turns one [`Record`] into one self-delimiting frame and
//! reads frames back one at a time. Recovery relies on the codec reading
//! *exactly* one frame per call so that the byte offset after every good
//! record is known.

use std::io::{self, BufRead};

use crate::record::Record;

/// Boxed error used as the source of codec failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying byte resource failed. Never caused by bad data.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The bytes at the current offset are not a complete, valid record.
    #[error("malformed record: {0}")]
    Malformed(#[source] BoxError),
    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[source] BoxError),
}

impl CodecError {
    /// Wraps a parse failure.
    pub fn malformed(err: impl Into<BoxError>) -> Self {
        Self::Malformed(err.into())
    }

    /// Wraps a serialization failure.
    pub fn encode(err: impl Into<BoxError>) -> Self {
        Self::Encode(err.into())
    }

    /// Returns `true` if the error describes bad data rather than a failing resource.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Encodes and decodes [`Record`]s as self-delimiting frames.
///
/// Implementations must not read past the end of the frame they decode.
pub trait RecordCodec<K, V>: Send + Sync + 'static {
    /// Appends the encoded frame for `record` to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the record cannot be serialized.
    fn encode(&self, record: &Record<K, V>, out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Reads one frame from `input`.
    ///
    /// Returns `Ok(None)` when `input` is exhausted before the first byte of a
    /// frame (clean end of log).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] if the frame is corrupt or cut short,
    /// and [`CodecError::Io`] if reading from `input` fails.
    fn decode(&self, input: &mut dyn BufRead) -> Result<Option<Record<K, V>>, CodecError>;
}
