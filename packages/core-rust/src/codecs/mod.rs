//! Built-in [`RecordCodec`](crate::codec::RecordCodec) implementations.

mod json;
mod msgpack;

pub use json::JsonLinesCodec;
pub use msgpack::MsgPackCodec;
