//! Verity ledger - append-only hash-chained event log with Merkle proofs
//!
//! Every completed computation leaves exactly one entry here. Entries form
//! a hash chain from a genesis sentinel, an RFC 6962 Merkle tree indexes
//! them for O(log n) inclusion proofs, and signed certificates export
//! (entry, proof, root, signature) bundles that verify offline.

#![deny(unsafe_code)]

mod certificate;
mod chain;
mod entry;
mod error;
mod merkle;

pub use certificate::Certificate;
pub use chain::{ChainVerification, Ledger};
pub use entry::{compute_entry_hash, EntryType, LedgerEntry, GENESIS};
pub use error::LedgerError;
pub use merkle::{MerkleProof, MerkleTree};
