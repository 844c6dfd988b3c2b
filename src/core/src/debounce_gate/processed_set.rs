//! Dedupe keys for recordings already placed in the batch being built.
//!
//! A key is held by a [`ProcessedClaim`] and removed when the claim is dropped,
//! so no exit path of a save (success, error, or a cancelled future) can leave
//! a stale key behind to block a later retry.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub local_id: Uuid,
    pub timestamp_label: String,
}

impl DedupeKey {
    pub fn new(local_id: Uuid, timestamp_label: impl Into<String>) -> Self {
        Self {
            local_id,
            timestamp_label: timestamp_label.into(),
        }
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_id, self.timestamp_label)
    }
}

#[derive(Debug, Default)]
pub struct ProcessedSet {
    keys: Mutex<HashSet<DedupeKey>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<DedupeKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `key`, or returns `None` if it is already claimed.
    pub fn claim(&self, key: DedupeKey) -> Option<ProcessedClaim<'_>> {
        if self.keys().insert(key.clone()) {
            Some(ProcessedClaim { set: self, key })
        } else {
            debug!("[{}] already in batch; skipped", key);
            None
        }
    }

    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.keys().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ProcessedClaim<'a> {
    set: &'a ProcessedSet,
    key: DedupeKey,
}

impl ProcessedClaim<'_> {
    pub fn key(&self) -> &DedupeKey {
        &self.key
    }
}

impl Drop for ProcessedClaim<'_> {
    fn drop(&mut self) {
        self.set.keys().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_claims_are_refused() {
        let set = ProcessedSet::new();
        let id = Uuid::new_v4();
        let first = set.claim(DedupeKey::new(id, "10:00:01"));
        assert!(first.is_some());
        assert!(set.claim(DedupeKey::new(id, "10:00:01")).is_none());
        // Same item re-recorded under a new label is a different key.
        assert!(set.claim(DedupeKey::new(id, "10:00:05")).is_some());
    }

    #[test]
    fn dropping_claims_empties_the_set() {
        let set = ProcessedSet::new();
        let claims: Vec<_> = (0..3)
            .filter_map(|i| set.claim(DedupeKey::new(Uuid::new_v4(), format!("t{}", i))))
            .collect();
        assert_eq!(set.len(), 3);
        assert_eq!(claims[1].key().timestamp_label, "t1");

        drop(claims);
        assert!(set.is_empty());
    }

    #[test]
    fn claims_released_on_unwind() {
        let set = ProcessedSet::new();
        let key = DedupeKey::new(Uuid::new_v4(), "x");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _claim = set.claim(key.clone());
            panic!("save aborted");
        }));
        assert!(result.is_err());
        assert!(!set.contains(&key));
    }
}
