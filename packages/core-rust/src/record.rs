//! The unit of persistence in a memo log.

use serde::{Deserialize, Serialize};

/// One memoized result as it is persisted: a key and the value computed for it.
///
/// Records are immutable once queued. A key may appear many times in a log;
/// replaying the log in order makes the last occurrence win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<K, V> {
    /// The argument the computation was invoked with.
    pub key: K,
    /// The value the computation produced for `key`.
    pub value: V,
}

impl<K, V> Record<K, V> {
    /// Creates a record from a key and its computed value.
    #[must_use]
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Splits the record into its key and value.
    #[must_use]
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}
