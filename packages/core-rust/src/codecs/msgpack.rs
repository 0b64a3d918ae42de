//! `MessagePack` codec backed by `rmp-serde`.

use std::io::{self, BufRead};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{CodecError, RecordCodec};
use crate::record::Record;

/// Encodes each record as one `MessagePack` map (`{"key": .., "value": ..}`).
///
/// `MessagePack` values carry their own lengths, so no extra framing is
/// needed. A frame cut short by a crash surfaces as an unexpected EOF inside
/// the decoder and is reported as malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl<K, V> RecordCodec<K, V> for MsgPackCodec
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &Record<K, V>, out: &mut Vec<u8>) -> Result<(), CodecError> {
        rmp_serde::encode::write_named(out, record).map_err(CodecError::encode)
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<Option<Record<K, V>>, CodecError> {
        if input.fill_buf()?.is_empty() {
            return Ok(None);
        }
        match rmp_serde::from_read(&mut *input) {
            Ok(record) => Ok(Some(record)),
            Err(
                rmp_serde::decode::Error::InvalidMarkerRead(err)
                | rmp_serde::decode::Error::InvalidDataRead(err),
            ) if err.kind() != io::ErrorKind::UnexpectedEof => Err(CodecError::Io(err)),
            Err(err) => Err(CodecError::malformed(err)),
        }
    }
}
