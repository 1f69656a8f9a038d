//! Ledger entries and the hash chain link rule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verity_crypto::{hash_parts, to_hex};

/// Sentinel `prev_hash` for the first entry.
pub const GENESIS: &str = "GENESIS";

/// What kind of event an entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// A completed interpreter run, successful or not.
    Evaluation,
    /// A standalone constraint check.
    ConstraintCheck,
    /// A request refused before evaluation (gate or structural).
    Rejection,
    /// Ledger lifecycle events.
    System,
}

impl EntryType {
    pub fn name(&self) -> &'static str {
        match self {
            EntryType::Evaluation => "evaluation",
            EntryType::ConstraintCheck => "constraint_check",
            EntryType::Rejection => "rejection",
            EntryType::System => "system",
        }
    }
}

/// One immutable record in the chain.
///
/// `this_hash` covers every other field, and `prev_hash` is the previous
/// entry's `this_hash` (the genesis sentinel at index 0), so editing any
/// historical entry breaks every later link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub entry_type: EntryType,
    /// BLAKE3 hex digest of the full payload, stored elsewhere.
    pub payload_hash: String,
    /// Short human-readable summary of the outcome.
    pub result_summary: String,
    pub prev_hash: String,
    pub this_hash: String,
}

impl LedgerEntry {
    /// Recompute what `this_hash` should be for this entry's fields.
    pub fn expected_hash(&self) -> String {
        compute_entry_hash(
            self.index,
            &self.timestamp,
            self.entry_type,
            &self.payload_hash,
            &self.result_summary,
            &self.prev_hash,
        )
    }
}

/// The chain link rule: a length-prefixed BLAKE3 over every field that
/// precedes `this_hash`.
pub fn compute_entry_hash(
    index: u64,
    timestamp: &DateTime<Utc>,
    entry_type: EntryType,
    payload_hash: &str,
    result_summary: &str,
    prev_hash: &str,
) -> String {
    let digest = hash_parts(&[
        &index.to_le_bytes(),
        timestamp.to_rfc3339().as_bytes(),
        entry_type.name().as_bytes(),
        payload_hash.as_bytes(),
        result_summary.as_bytes(),
        prev_hash.as_bytes(),
    ]);
    to_hex(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LedgerEntry {
        let timestamp = Utc::now();
        let this_hash = compute_entry_hash(
            0,
            &timestamp,
            EntryType::Evaluation,
            "payload",
            "ok",
            GENESIS,
        );
        LedgerEntry {
            index: 0,
            timestamp,
            entry_type: EntryType::Evaluation,
            payload_hash: "payload".into(),
            result_summary: "ok".into(),
            prev_hash: GENESIS.into(),
            this_hash,
        }
    }

    #[test]
    fn expected_hash_matches_stored_hash() {
        let entry = entry();
        assert_eq!(entry.expected_hash(), entry.this_hash);
    }

    #[test]
    fn any_field_change_breaks_the_hash() {
        let mut tampered = entry();
        tampered.result_summary = "rewritten".into();
        assert_ne!(tampered.expected_hash(), tampered.this_hash);
    }

    #[test]
    fn entry_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EntryType::ConstraintCheck).unwrap(),
            "constraint_check"
        );
        assert_eq!(EntryType::Rejection.name(), "rejection");
    }
}
