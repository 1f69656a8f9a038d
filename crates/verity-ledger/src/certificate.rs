//! Exportable, self-contained audit certificates
//!
//! A certificate binds one ledger entry to a Merkle root with an inclusion
//! proof and an issuer signature. A relying party can verify it with the
//! certificate alone; the ledger itself is not consulted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verity_crypto::{hash_parts, verify_signature, Hash32};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::merkle::MerkleProof;

/// The signed message: a digest binding the root to the entry hash.
pub(crate) fn certificate_message(merkle_root: &str, this_hash: &str) -> Hash32 {
    hash_parts(&[merkle_root.as_bytes(), this_hash.as_bytes()])
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: Uuid,
    pub entry: LedgerEntry,
    pub proof: MerkleProof,
    /// Root the proof was issued against, hex-encoded.
    pub merkle_root: String,
    /// Hex-encoded Ed25519 verifying key of the issuer.
    pub issuer: String,
    /// Hex-encoded detached signature over the root and entry hash.
    pub signature: String,
}

impl Certificate {
    /// Verify the certificate offline: the entry hashes to its stored
    /// digest, the proof places that digest under the root, and the
    /// signature binds root and digest to the issuer.
    pub fn verify(&self) -> Result<(), LedgerError> {
        if self.entry.expected_hash() != self.entry.this_hash {
            return Err(LedgerError::CertificateInvalid(
                "entry hash does not match entry contents".into(),
            ));
        }
        if self.entry.index != self.proof.leaf_index {
            return Err(LedgerError::CertificateInvalid(
                "proof is for a different entry index".into(),
            ));
        }
        if !self
            .proof
            .verify(self.entry.this_hash.as_bytes(), &self.merkle_root)
        {
            return Err(LedgerError::CertificateInvalid(
                "inclusion proof does not reach the stated root".into(),
            ));
        }
        let message = certificate_message(&self.merkle_root, &self.entry.this_hash);
        verify_signature(&self.issuer, &message, &self.signature)?;
        Ok(())
    }
}
