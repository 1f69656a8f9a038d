//! Collaborator seams: payload storage and entry replication
//!
//! The orchestrator consumes these traits but only ships in-memory
//! implementations; durable stores and real replication transports live
//! outside the core. The local ledger stays authoritative either way: a
//! replica that refuses an entry changes nothing here.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use verity_ledger::LedgerEntry;

/// Content-addressed storage for full payloads. Ledger entries carry only
/// `payload_hash`; the bytes behind it live here.
pub trait PayloadStore: Send + Sync {
    /// Store `payload` under `key` on behalf of `identity`.
    fn store(&self, key: &str, payload: &serde_json::Value, identity: &str);

    /// Fetch the payload stored under `key`, if `identity` stored one.
    fn retrieve(&self, key: &str, identity: &str) -> Option<serde_json::Value>;
}

/// Forward appended entries to replicas. Returns whether the replica
/// acknowledged; a missing ack is logged, never retried.
pub trait Replicator: Send + Sync {
    fn submit(&self, entry: &LedgerEntry) -> bool;
}

/// HashMap-backed store, keyed by (identity, key).
#[derive(Default)]
pub struct InMemoryStore {
    payloads: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStore for InMemoryStore {
    fn store(&self, key: &str, payload: &serde_json::Value, identity: &str) {
        self.payloads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((identity.to_string(), key.to_string()), payload.clone());
    }

    fn retrieve(&self, key: &str, identity: &str) -> Option<serde_json::Value> {
        self.payloads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(identity.to_string(), key.to_string()))
            .cloned()
    }
}

/// Replicator that acknowledges everything and forwards nothing.
#[derive(Default)]
pub struct NullReplicator;

impl Replicator for NullReplicator {
    fn submit(&self, _entry: &LedgerEntry) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_is_scoped_by_identity() {
        let store = InMemoryStore::new();
        store.store("k", &json!({"a": 1}), "alice");
        assert_eq!(store.retrieve("k", "alice"), Some(json!({"a": 1})));
        assert_eq!(store.retrieve("k", "bob"), None);
    }
}
