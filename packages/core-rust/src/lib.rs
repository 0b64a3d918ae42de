//! memolog core — the record type, pluggable record codecs, and the byte
//! resources a memo log can live in.

pub mod codec;
pub mod codecs;
pub mod record;
pub mod resource;

pub use codec::{BoxError, CodecError, RecordCodec};
pub use codecs::{JsonLinesCodec, MsgPackCodec};
pub use record::Record;
pub use resource::{LogResource, SharedBuffer};
