//! Newline-delimited JSON codec.

use std::io::{self, BufRead};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{CodecError, RecordCodec};
use crate::record::Record;

/// Encodes each record as one JSON object followed by `\n`.
///
/// The terminator is part of the frame: a final line without it is the
/// remains of an interrupted append and decodes as malformed, even if the
/// bytes before it happen to parse.
///
/// `serde_json` writes non-finite floats as `null`, which then fails to
/// decode. Every frame is decoded once before it is accepted, and one that
/// does not read back is an encode error instead of a log entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesCodec;

impl<K, V> RecordCodec<K, V> for JsonLinesCodec
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &Record<K, V>, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        let checked = serde_json::to_writer(&mut *out, record)
            .map_err(CodecError::encode)
            .and_then(|()| {
                serde_json::from_slice::<Record<K, V>>(&out[start..])
                    .map(drop)
                    .map_err(|err| CodecError::encode(format!("record does not read back: {err}")))
            });
        if let Err(err) = checked {
            out.truncate(start);
            return Err(err);
        }
        out.push(b'\n');
        Ok(())
    }

    fn decode(&self, input: &mut dyn BufRead) -> Result<Option<Record<K, V>>, CodecError> {
        let mut line = Vec::new();
        if input.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            return Err(CodecError::malformed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record is missing its terminator after {} bytes", line.len()),
            )));
        }
        serde_json::from_slice(&line)
            .map(Some)
            .map_err(CodecError::malformed)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode_all(records: &[Record<String, i64>]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            RecordCodec::encode(&JsonLinesCodec, record, &mut out).unwrap();
        }
        out
    }

    fn decode_next(input: &mut Cursor<Vec<u8>>) -> Result<Option<Record<String, i64>>, CodecError> {
        RecordCodec::decode(&JsonLinesCodec, input)
    }

    #[test]
    fn encodes_one_line_per_record() {
        let bytes = encode_all(&[Record::new("a".into(), 1), Record::new("b".into(), 2)]);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"key\":\"a\",\"value\":1}\n{\"key\":\"b\",\"value\":2}\n"
        );
    }

    #[test]
    fn decodes_records_then_clean_end() {
        let bytes = encode_all(&[Record::new("a".into(), 1), Record::new("b".into(), 2)]);
        let mut input = Cursor::new(bytes);

        assert_eq!(decode_next(&mut input).unwrap(), Some(Record::new("a".into(), 1)));
        assert_eq!(decode_next(&mut input).unwrap(), Some(Record::new("b".into(), 2)));
        assert!(decode_next(&mut input).unwrap().is_none());
    }

    #[test]
    fn unterminated_line_is_malformed() {
        let mut input = Cursor::new(br#"{"key":"a","value":1}"#.to_vec());
        let err = decode_next(&mut input).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn garbage_line_is_malformed() {
        let mut input = Cursor::new(b"{\"key\":\"a\",\"val\n".to_vec());
        assert!(decode_next(&mut input).unwrap_err().is_malformed());
    }

    #[test]
    fn wrong_value_type_is_malformed() {
        let mut input = Cursor::new(b"{\"key\":\"a\",\"value\":\"one\"}\n".to_vec());
        assert!(decode_next(&mut input).unwrap_err().is_malformed());
    }

    #[test]
    fn non_finite_float_is_an_encode_error() {
        let mut out = Vec::new();
        RecordCodec::encode(&JsonLinesCodec, &Record::new(0_u32, 0.5_f64), &mut out).unwrap();
        let before = out.clone();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = RecordCodec::encode(&JsonLinesCodec, &Record::new(1_u32, value), &mut out)
                .unwrap_err();
            assert!(matches!(err, CodecError::Encode(_)), "unexpected error: {err}");
            assert_eq!(out, before, "a rejected frame must leave no bytes behind");
        }

        let mut input = Cursor::new(out);
        let first: Record<u32, f64> = RecordCodec::decode(&JsonLinesCodec, &mut input)
            .unwrap()
            .unwrap();
        assert_eq!(first, Record::new(0, 0.5));
    }

    #[test]
    fn does_not_consume_past_the_frame() {
        let mut bytes = encode_all(&[Record::new("a".into(), 1)]);
        let frame_len = bytes.len() as u64;
        bytes.extend_from_slice(b"tail");
        let mut input = Cursor::new(bytes);

        decode_next(&mut input).unwrap();
        assert_eq!(input.position(), frame_len);
    }
}
