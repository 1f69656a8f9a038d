//! The append-only ledger
//!
//! A `Ledger` owns the entry vector, the running Merkle tree, and the tail
//! hash, all behind one `RwLock`. Append is the single serialization point:
//! the entry index order is the total order of record. Reads take the read
//! lock and see a consistent snapshot. Entries are never updated or
//! deleted; corrections are new compensating entries.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use verity_crypto::SigningIdentity;

use crate::certificate::{certificate_message, Certificate};
use crate::entry::{compute_entry_hash, EntryType, LedgerEntry, GENESIS};
use crate::error::LedgerError;
use crate::merkle::{MerkleProof, MerkleTree};

/// Outcome of a full chain audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: u64,
    /// Index of the first entry whose hash or linkage fails, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broken_index: Option<u64>,
    pub merkle_root_matches: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct LedgerState {
    entries: Vec<LedgerEntry>,
    tree: MerkleTree,
}

/// Hash-chained, Merkle-indexed event log.
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                entries: Vec::new(),
                tree: MerkleTree::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        // A poisoned lock means a panic mid-read elsewhere; entries are
        // append-only so the data itself is still coherent.
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new entry and return it.
    ///
    /// The tail hash, index, and Merkle leaf are updated inside one write
    /// lock, so a new tail is only ever observed fully hashed.
    pub fn append(
        &self,
        entry_type: EntryType,
        payload_hash: impl Into<String>,
        result_summary: impl Into<String>,
    ) -> LedgerEntry {
        let payload_hash = payload_hash.into();
        let result_summary = result_summary.into();

        let mut state = self.write();
        let index = state.entries.len() as u64;
        let prev_hash = match state.entries.last() {
            Some(prev) => prev.this_hash.clone(),
            None => GENESIS.to_string(),
        };
        let timestamp = Utc::now();
        let this_hash = compute_entry_hash(
            index,
            &timestamp,
            entry_type,
            &payload_hash,
            &result_summary,
            &prev_hash,
        );

        let entry = LedgerEntry {
            index,
            timestamp,
            entry_type,
            payload_hash,
            result_summary,
            prev_hash,
            this_hash,
        };
        state.tree.push(entry.this_hash.as_bytes());
        state.entries.push(entry.clone());
        debug!(index, entry_type = entry_type.name(), "ledger append");
        entry
    }

    pub fn len(&self) -> u64 {
        self.read().entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<LedgerEntry> {
        self.read().entries.get(index as usize).cloned()
    }

    /// A page of entries plus the total count and current Merkle root,
    /// all from one consistent snapshot.
    pub fn entries(&self, limit: usize, offset: usize) -> (Vec<LedgerEntry>, u64, String) {
        let state = self.read();
        let page = state
            .entries
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, state.entries.len() as u64, state.tree.root_hex())
    }

    pub fn merkle_root(&self) -> String {
        self.read().tree.root_hex()
    }

    /// Inclusion proof for the entry at `index` against the current root.
    pub fn proof(&self, index: u64) -> Result<MerkleProof, LedgerError> {
        self.read().tree.proof(index)
    }

    /// Recompute every entry hash, every chain link, and the Merkle root.
    /// Reports; never repairs.
    pub fn verify_chain(&self) -> ChainVerification {
        let state = self.read();
        let total_entries = state.entries.len() as u64;

        let mut first_broken_index = None;
        let mut message = None;
        let mut expected_prev = GENESIS.to_string();
        let mut rebuilt = MerkleTree::new();

        for (i, entry) in state.entries.iter().enumerate() {
            let i = i as u64;
            let broken = if entry.index != i {
                Some(format!("entry {i} carries index {}", entry.index))
            } else if entry.prev_hash != expected_prev {
                Some(format!("entry {i} does not chain from its predecessor"))
            } else if entry.expected_hash() != entry.this_hash {
                Some(format!("entry {i} hash does not match its contents"))
            } else {
                None
            };
            if let Some(reason) = broken {
                first_broken_index = Some(i);
                message = Some(reason);
                break;
            }
            expected_prev = entry.this_hash.clone();
            rebuilt.push(entry.this_hash.as_bytes());
        }

        // Only meaningful when every link checked out; a broken chain
        // stops the rebuild early.
        let merkle_root_matches =
            first_broken_index.is_none() && rebuilt.root() == state.tree.root();
        if first_broken_index.is_none() && !merkle_root_matches {
            message = Some("merkle root does not match entry hashes".into());
        }

        let valid = first_broken_index.is_none() && merkle_root_matches;
        if !valid {
            warn!(?first_broken_index, "ledger chain verification failed");
        }
        ChainVerification {
            valid,
            total_entries,
            first_broken_index,
            merkle_root_matches,
            message,
        }
    }

    /// Issue a signed, self-contained certificate for the entry at `index`.
    ///
    /// Refuses when the chain fails verification: a certificate is a claim
    /// about the whole ledger, not one entry.
    pub fn certificate(
        &self,
        index: u64,
        issuer: &SigningIdentity,
    ) -> Result<Certificate, LedgerError> {
        let audit = self.verify_chain();
        if !audit.valid {
            return Err(LedgerError::IntegrityCompromised(
                audit
                    .message
                    .unwrap_or_else(|| "chain verification failed".into()),
            ));
        }

        let state = self.read();
        let entry = state
            .entries
            .get(index as usize)
            .cloned()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                len: state.entries.len() as u64,
            })?;
        let proof = state.tree.proof(index)?;
        let merkle_root = state.tree.root_hex();
        drop(state);

        let signature = issuer.sign(&certificate_message(&merkle_root, &entry.this_hash));
        Ok(Certificate {
            certificate_id: uuid::Uuid::new_v4(),
            entry,
            proof,
            merkle_root,
            issuer: issuer.issuer_id(),
            signature,
        })
    }

    /// Overwrite a historical summary, breaking the chain. Test-only.
    #[cfg(test)]
    pub(crate) fn tamper_summary(&self, index: u64, summary: &str) {
        let mut state = self.write();
        if let Some(entry) = state.entries.get_mut(index as usize) {
            entry.result_summary = summary.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Ledger {
        let ledger = Ledger::new();
        for i in 0..5 {
            ledger.append(EntryType::Evaluation, format!("payload-{i}"), "ok");
        }
        ledger
    }

    #[test]
    fn appends_chain_from_genesis() {
        let ledger = seeded();
        let first = ledger.get(0).unwrap();
        assert_eq!(first.prev_hash, GENESIS);
        let second = ledger.get(1).unwrap();
        assert_eq!(second.prev_hash, first.this_hash);
        assert_eq!(ledger.len(), 5);
    }

    #[test]
    fn intact_chain_verifies() {
        let audit = seeded().verify_chain();
        assert!(audit.valid);
        assert!(audit.merkle_root_matches);
        assert_eq!(audit.total_entries, 5);
        assert_eq!(audit.first_broken_index, None);
    }

    #[test]
    fn empty_ledger_verifies() {
        let audit = Ledger::new().verify_chain();
        assert!(audit.valid);
        assert_eq!(audit.total_entries, 0);
    }

    #[test]
    fn tampering_reports_first_broken_index() {
        let ledger = seeded();
        ledger.tamper_summary(2, "rewritten history");
        let audit = ledger.verify_chain();
        assert!(!audit.valid);
        assert_eq!(audit.first_broken_index, Some(2));
    }

    #[test]
    fn pagination_returns_consistent_snapshot() {
        let ledger = seeded();
        let (page, total, root) = ledger.entries(2, 1);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].index, 1);
        assert_eq!(root, ledger.merkle_root());
    }

    #[test]
    fn proof_covers_each_entry() {
        let ledger = seeded();
        let root = ledger.merkle_root();
        for i in 0..5 {
            let entry = ledger.get(i).unwrap();
            let proof = ledger.proof(i).unwrap();
            assert!(proof.verify(entry.this_hash.as_bytes(), &root));
        }
    }

    #[test]
    fn certificate_round_trip() {
        let ledger = seeded();
        let issuer = SigningIdentity::from_seed(&[9u8; 32]);
        let certificate = ledger.certificate(3, &issuer).unwrap();
        assert!(certificate.verify().is_ok());
        assert_eq!(certificate.entry.index, 3);
    }

    #[test]
    fn certificate_refused_after_tampering() {
        let ledger = seeded();
        ledger.tamper_summary(1, "rewritten");
        let issuer = SigningIdentity::from_seed(&[9u8; 32]);
        assert!(matches!(
            ledger.certificate(3, &issuer),
            Err(LedgerError::IntegrityCompromised(_))
        ));
    }

    #[test]
    fn concurrent_appends_get_distinct_indices() {
        use std::sync::Arc;
        let ledger = Arc::new(Ledger::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        ledger.append(EntryType::System, format!("{t}-{i}"), "ok");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.len(), 200);
        assert!(ledger.verify_chain().valid);
    }
}
