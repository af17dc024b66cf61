//! Write-once correlation cache: request identity → resolved target namespace.
//!
//! Entries are never overwritten and never evicted. A second `put` for a key
//! is a no-op, so late writes from a superseded resolution pass are harmless.
//! Absence means "not resolved yet"; failures are never recorded.
//!
//! The cache lives exactly as long as the session that owns it.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::trace;

use crate::model::ObjectKey;

#[derive(Debug, Default)]
pub struct CorrelationCache {
    entries: RwLock<HashMap<ObjectKey, String>>,
}

impl CorrelationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved namespace for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<String> {
        match self.entries.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    #[must_use]
    pub fn has(&self, key: &ObjectKey) -> bool {
        match self.entries.read() {
            Ok(guard) => guard.contains_key(key),
            Err(poisoned) => poisoned.into_inner().contains_key(key),
        }
    }

    /// Record `namespace` for `key` unless the key is already present.
    ///
    /// Returns `true` when this call inserted the entry.
    pub fn put(&self, key: ObjectKey, namespace: impl Into<String>) -> bool {
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.contains_key(&key) {
            trace!(request = %key, "Correlation already cached; keeping first value");
            return false;
        }
        guard.insert(key, namespace.into());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of all entries keyed by `namespace/name`.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let guard = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .iter()
            .map(|(key, namespace)| (key.to_string(), namespace.clone()))
            .collect()
    }
}
