//! Ledger errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Entry index {index} out of range (ledger holds {len} entries)")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("Ledger integrity compromised: {0}")]
    IntegrityCompromised(String),

    #[error("Certificate does not verify: {0}")]
    CertificateInvalid(String),

    #[error(transparent)]
    Crypto(#[from] verity_crypto::CryptoError),
}
