//! Shared cache state: the in-memory map and the write-once failure flag.
//!
//! The two live behind separate locks so that a reader waiting on the map
//! never delays visibility of a writer failure, and vice versa.

use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::WriteError;

// ---------------------------------------------------------------------------
// CacheState
// ---------------------------------------------------------------------------

/// The in-memory map of memoized results.
///
/// Callers only read through [`lookup`](Self::lookup); the durability writer
/// is the only caller of [`insert`](Self::insert) once the memo is running.
pub(crate) struct CacheState<K, V> {
    entries: RwLock<AHashMap<K, V>>,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Wraps a map rebuilt from the log.
    pub(crate) fn from_map(entries: AHashMap<K, V>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of the value stored for `key`.
    pub(crate) fn lookup(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub(crate) fn insert(&self, key: K, value: V) -> Option<V> {
        self.entries.write().insert(key, value)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// FailureFlag
// ---------------------------------------------------------------------------

/// Terminal writer error, set at most once.
#[derive(Default)]
pub(crate) struct FailureFlag {
    error: RwLock<Option<Arc<WriteError>>>,
}

impl FailureFlag {
    /// Records `err` unless an error is already recorded. Returns whichever
    /// error ends up stored; the first one wins.
    pub(crate) fn set(&self, err: WriteError) -> Arc<WriteError> {
        let mut slot = self.error.write();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        let err = Arc::new(err);
        *slot = Some(Arc::clone(&err));
        err
    }

    pub(crate) fn get(&self) -> Option<Arc<WriteError>> {
        self.error.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn lookup_insert_overwrite() {
        let state = CacheState::from_map(AHashMap::new());
        assert!(state.is_empty());
        assert!(state.lookup(&"a").is_none());

        assert!(state.insert("a", 1).is_none());
        assert_eq!(state.lookup(&"a"), Some(1));

        assert_eq!(state.insert("a", 2), Some(1));
        assert_eq!(state.lookup(&"a"), Some(2));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn from_map_exposes_recovered_entries() {
        let mut map = AHashMap::new();
        map.insert("x".to_string(), vec![1, 2]);
        let state = CacheState::from_map(map);
        assert_eq!(state.lookup(&"x".to_string()), Some(vec![1, 2]));
    }

    #[test]
    fn failure_flag_first_error_wins() {
        let flag = FailureFlag::default();
        assert!(flag.get().is_none());

        let first = flag.set(WriteError::Io(io::Error::other("first")));
        let second = flag.set(WriteError::Io(io::Error::other("second")));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(flag.get().unwrap().to_string(), "failed to append record: first");
    }
}
