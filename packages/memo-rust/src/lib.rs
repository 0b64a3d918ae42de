//! memolog — persistent memoization backed by an append-only log.
//!
//! A [`Memo`] wraps an async computation `K -> Result<V, E>` with an
//! in-memory cache. New results are handed to a single background writer
//! that appends them to a log resource, so a later process can reopen the
//! log and answer from it instead of recomputing. A log torn by a crash is
//! repaired on open by truncating it after the last complete record.

pub mod config;
pub mod error;
pub mod memo;
mod recovery;
mod state;
pub mod stats;
mod writer;

pub use config::MemoConfig;
pub use error::{CallError, CloseError, OpenError, WriteError};
pub use memo::{Closed, Memo};
pub use memolog_core::{
    CodecError, JsonLinesCodec, LogResource, MsgPackCodec, Record, RecordCodec, SharedBuffer,
};
pub use stats::MemoStats;
pub use tokio_util::sync::CancellationToken;
