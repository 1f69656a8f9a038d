//! Verity crypto - BLAKE3 hashing and Ed25519 issuer signatures
//!
//! Everything tamper-evident in Verity reduces to the two primitives in
//! this crate: content hashing for the ledger chain and Merkle tree, and
//! detached signatures for exported certificates.

#![deny(unsafe_code)]

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// A 32-byte BLAKE3 digest.
pub type Hash32 = [u8; 32];

/// Hash a single byte string.
pub fn hash_bytes(data: &[u8]) -> Hash32 {
    *blake3::hash(data).as_bytes()
}

/// Hash a sequence of fields as one message.
///
/// Each part is prefixed with its length so that field boundaries are
/// unambiguous: `("ab", "c")` and `("a", "bc")` hash differently.
pub fn hash_parts(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hex-encode a digest for wire types and logs.
pub fn to_hex(hash: &Hash32) -> String {
    hex::encode(hash)
}

/// Decode a hex digest back into raw bytes.
pub fn from_hex(encoded: &str) -> Result<Hash32, CryptoError> {
    let bytes = hex::decode(encoded).map_err(|_| CryptoError::InvalidHex)?;
    bytes.try_into().map_err(|_| CryptoError::InvalidHex)
}

/// An Ed25519 signing identity used to issue certificates.
///
/// The secret key material is zeroized when the identity is dropped.
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    /// Generate a fresh identity from the OS entropy source.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(seed.as_mut());
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Restore an identity from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Hex-encoded public verifying key; used as the certificate issuer id.
    pub fn issuer_id(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Produce a hex-encoded detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Verify a detached hex signature against a hex issuer id.
pub fn verify_signature(
    issuer_id: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = hex::decode(issuer_id)
        .map_err(|_| CryptoError::InvalidKey)?
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidKey)?;

    let sig_bytes = hex::decode(signature_hex).map_err(|_| CryptoError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureMismatch)
}

/// Crypto-related errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid hex encoding")]
    InvalidHex,

    #[error("Invalid verifying key")]
    InvalidKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Signature does not match message")]
    SignatureMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_bytes(b"verity"), hash_bytes(b"verity"));
        assert_ne!(hash_bytes(b"verity"), hash_bytes(b"verity2"));
    }

    #[test]
    fn hash_parts_respects_field_boundaries() {
        assert_ne!(
            hash_parts(&[b"ab", b"c"]),
            hash_parts(&[b"a", b"bc"]),
            "field boundaries must be part of the message"
        );
    }

    #[test]
    fn hex_round_trip() {
        let digest = hash_bytes(b"round trip");
        let encoded = to_hex(&digest);
        assert_eq!(from_hex(&encoded).unwrap(), digest);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(from_hex("zzzz"), Err(CryptoError::InvalidHex)));
        assert!(matches!(from_hex("abcd"), Err(CryptoError::InvalidHex)));
    }

    #[test]
    fn sign_and_verify() {
        let identity = SigningIdentity::generate();
        let signature = identity.sign(b"certified");
        assert!(verify_signature(&identity.issuer_id(), b"certified", &signature).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let identity = SigningIdentity::generate();
        let signature = identity.sign(b"certified");
        assert!(matches!(
            verify_signature(&identity.issuer_id(), b"tampered", &signature),
            Err(CryptoError::SignatureMismatch)
        ));
    }

    #[test]
    fn verify_rejects_wrong_issuer() {
        let identity = SigningIdentity::generate();
        let other = SigningIdentity::generate();
        let signature = identity.sign(b"certified");
        assert!(verify_signature(&other.issuer_id(), b"certified", &signature).is_err());
    }

    #[test]
    fn seed_restores_same_issuer() {
        let seed = [7u8; 32];
        let a = SigningIdentity::from_seed(&seed);
        let b = SigningIdentity::from_seed(&seed);
        assert_eq!(a.issuer_id(), b.issuer_id());
    }

    proptest! {
        #[test]
        fn hashing_is_deterministic(data: Vec<u8>) {
            prop_assert_eq!(hash_bytes(&data), hash_bytes(&data));
        }

        #[test]
        fn signatures_verify_for_any_message(data: Vec<u8>) {
            let identity = SigningIdentity::from_seed(&[42u8; 32]);
            let signature = identity.sign(&data);
            prop_assert!(verify_signature(&identity.issuer_id(), &data, &signature).is_ok());
        }
    }
}
