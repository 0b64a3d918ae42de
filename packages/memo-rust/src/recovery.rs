//! Startup replay of a memo log.
//!
//! Records are decoded one at a time from the resource's current position.
//! A decode that fails on bad data marks the start of a torn tail: the
//! resource is cut back to the end of the last good record so that the next
//! append lands directly after it. Corruption is repaired, never reported;
//! only I/O failures abort recovery.

use std::hash::Hash;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use ahash::AHashMap;
use memolog_core::{CodecError, LogResource, RecordCodec};

/// Outcome of replaying a log.
#[derive(Debug)]
pub(crate) struct Recovered<K, V> {
    /// Last value seen for every key.
    pub(crate) entries: AHashMap<K, V>,
    /// Number of records decoded, duplicates included.
    pub(crate) records: u64,
    /// Offset just past the last good record; appends start here.
    pub(crate) end_offset: u64,
    /// Bytes discarded from a torn tail.
    pub(crate) truncated_bytes: u64,
}

/// Replays every record readable from `resource`, repairing a torn tail.
///
/// On success the resource is positioned at `end_offset`.
///
/// # Errors
///
/// Returns [`CodecError::Io`] if reading, seeking or truncating the resource
/// fails.
pub(crate) fn recover<K, V, R, C>(resource: &mut R, codec: &C) -> Result<Recovered<K, V>, CodecError>
where
    K: Eq + Hash,
    R: LogResource,
    C: RecordCodec<K, V>,
{
    let start = resource.stream_position()?;
    let mut entries = AHashMap::new();
    let mut records = 0_u64;
    let mut good = 0_u64;

    let corrupt = {
        let mut reader = OffsetReader::new(&mut *resource);
        loop {
            match codec.decode(&mut reader) {
                Ok(Some(record)) => {
                    let (key, value) = record.into_parts();
                    entries.insert(key, value);
                    records += 1;
                    good = reader.consumed();
                }
                Ok(None) => break None,
                Err(err) if err.is_malformed() => break Some(err),
                Err(err) => return Err(err),
            }
        }
    };

    let end_offset = start + good;
    let mut truncated_bytes = 0;
    if let Some(err) = corrupt {
        let end = resource.seek(SeekFrom::End(0))?;
        truncated_bytes = end.saturating_sub(end_offset);
        tracing::warn!(
            offset = end_offset,
            discarded_bytes = truncated_bytes,
            error = %err,
            "truncating torn tail from memo log"
        );
        resource.seek(SeekFrom::Start(end_offset))?;
        resource.truncate(end_offset)?;
    } else {
        resource.seek(SeekFrom::Start(end_offset))?;
    }

    Ok(Recovered {
        entries,
        records,
        end_offset,
        truncated_bytes,
    })
}

// ---------------------------------------------------------------------------
// OffsetReader
// ---------------------------------------------------------------------------

/// Buffered reader that counts the bytes handed out to the decoder.
///
/// The inner `BufReader` reads ahead of the decoder, so the resource's own
/// position says nothing about where the last record ended; this count does.
struct OffsetReader<R> {
    inner: BufReader<R>,
    consumed: u64,
}

impl<R: Read> OffsetReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            consumed: 0,
        }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read> Read for OffsetReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for OffsetReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.consumed += amt as u64;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use memolog_core::{JsonLinesCodec, MsgPackCodec, Record, SharedBuffer};
    use proptest::prelude::*;

    use super::*;

    fn encode_records<C: RecordCodec<String, i64>>(codec: &C, records: &[(String, i64)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in records {
            codec
                .encode(&Record::new(key.clone(), *value), &mut out)
                .unwrap();
        }
        out
    }

    fn json_log(records: &[(&str, i64)]) -> Vec<u8> {
        let owned: Vec<(String, i64)> = records.iter().map(|(k, v)| ((*k).to_string(), *v)).collect();
        encode_records(&JsonLinesCodec, &owned)
    }

    fn recover_json(buf: &mut SharedBuffer) -> Recovered<String, i64> {
        recover(buf, &JsonLinesCodec).unwrap()
    }

    #[test]
    fn empty_log_recovers_nothing() {
        let mut buf = SharedBuffer::new();
        let recovered = recover_json(&mut buf);
        assert!(recovered.entries.is_empty());
        assert_eq!(recovered.records, 0);
        assert_eq!(recovered.end_offset, 0);
        assert_eq!(recovered.truncated_bytes, 0);
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn last_occurrence_wins() {
        let mut buf = SharedBuffer::from_bytes(json_log(&[("a", 1), ("b", 2), ("a", 3)]));
        let recovered = recover_json(&mut buf);

        assert_eq!(recovered.records, 3);
        assert_eq!(recovered.entries.len(), 2);
        assert_eq!(recovered.entries["a"], 3);
        assert_eq!(recovered.entries["b"], 2);
        assert_eq!(buf.position(), buf.len() as u64);
    }

    #[test]
    fn torn_tail_is_truncated_and_append_lands_after_valid_prefix() {
        let valid = json_log(&[("a", 1), ("b", 2)]);
        let mut bytes = valid.clone();
        bytes.extend_from_slice(br#"{"key":"c","va"#);
        let mut buf = SharedBuffer::from_bytes(bytes);

        let recovered = recover_json(&mut buf);
        assert_eq!(recovered.records, 2);
        assert_eq!(recovered.end_offset, valid.len() as u64);
        assert_eq!(recovered.truncated_bytes, 14);
        assert_eq!(buf.contents(), valid);

        buf.write_all(b"next").unwrap();
        let mut expected = valid;
        expected.extend_from_slice(b"next");
        assert_eq!(buf.contents(), expected);
    }

    #[test]
    fn corruption_in_the_middle_drops_everything_after_it() {
        let mut bytes = json_log(&[("a", 1)]);
        let prefix_len = bytes.len();
        bytes.extend_from_slice(b"not json\n");
        bytes.extend(json_log(&[("b", 2)]));
        let mut buf = SharedBuffer::from_bytes(bytes);

        let recovered = recover_json(&mut buf);
        assert_eq!(recovered.entries.len(), 1);
        assert!(!recovered.entries.contains_key("b"));
        assert_eq!(buf.len(), prefix_len);
    }

    #[test]
    fn recovery_starts_at_current_position() {
        let mut bytes = b"HEADER".to_vec();
        bytes.extend(json_log(&[("a", 1)]));
        bytes.extend_from_slice(b"{");
        let total_valid = bytes.len() as u64 - 1;
        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Start(6)).unwrap();

        let recovered: Recovered<String, i64> = recover(&mut cursor, &JsonLinesCodec).unwrap();
        assert_eq!(recovered.end_offset, total_valid);
        assert_eq!(cursor.position(), total_valid);
        assert_eq!(cursor.get_ref().len() as u64, total_valid);
    }

    #[test]
    fn msgpack_torn_tail_is_truncated() {
        let records = vec![("a".to_string(), 1), ("b".to_string(), -7)];
        let valid = encode_records(&MsgPackCodec, &records);
        let mut bytes = valid.clone();
        let extra = encode_records(&MsgPackCodec, &[("c".to_string(), 99)]);
        bytes.extend_from_slice(&extra[..extra.len() - 2]);
        let mut buf = SharedBuffer::from_bytes(bytes);

        let recovered: Recovered<String, i64> = recover(&mut buf, &MsgPackCodec).unwrap();
        assert_eq!(recovered.records, 2);
        assert_eq!(recovered.entries["b"], -7);
        assert_eq!(buf.contents(), valid);
    }

    /// A resource that cannot be read at all.
    struct Unreadable(Cursor<Vec<u8>>);

    impl Read for Unreadable {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "unreadable"))
        }
    }

    impl Write for Unreadable {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Unreadable {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl LogResource for Unreadable {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            LogResource::truncate(&mut self.0, len)
        }
    }

    #[test]
    fn read_failure_is_fatal() {
        let mut resource = Unreadable(Cursor::new(Vec::new()));
        let err = recover::<String, i64, _, _>(&mut resource, &JsonLinesCodec).unwrap_err();
        assert!(matches!(err, CodecError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
    }

    fn arb_records() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::vec(("[a-e]{1,3}", any::<i64>()), 0..40)
    }

    proptest! {
        #[test]
        fn recovery_is_idempotent(records in arb_records()) {
            let bytes = encode_records(&JsonLinesCodec, &records);
            let mut first = SharedBuffer::from_bytes(bytes);
            let once = recover_json(&mut first);

            let mut second = first.reopen();
            let twice = recover_json(&mut second);

            prop_assert_eq!(once.records, records.len() as u64);
            prop_assert_eq!(&once.entries, &twice.entries);
            prop_assert_eq!(twice.truncated_bytes, 0);
        }

        #[test]
        fn garbage_tail_never_survives(
            records in arb_records(),
            tail in prop::collection::vec(any::<u8>(), 1..64),
        ) {
            let valid = encode_records(&JsonLinesCodec, &records);
            let mut bytes = valid.clone();
            bytes.extend_from_slice(&tail);
            let mut buf = SharedBuffer::from_bytes(bytes);

            let recovered = recover_json(&mut buf);

            // Garbage may happen to decode as extra records, but the valid
            // prefix is always kept and nothing unparseable is left behind.
            prop_assert!(recovered.end_offset >= valid.len() as u64);
            prop_assert!(recovered.records >= records.len() as u64);
            prop_assert_eq!(&buf.contents()[..valid.len()], &valid[..]);
            let mut reread = buf.reopen();
            let again = recover_json(&mut reread);
            prop_assert_eq!(again.truncated_bytes, 0);
            prop_assert_eq!(again.records, recovered.records);
        }
    }
}
