//! Package sealing — SHA-256 digests and Ed25519 signatures.
//!
//! Packages are sealed with a SHA-256 digest over the framed bytes; a
//! signer additionally signs that digest. Key management is out of scope:
//! callers bring their own `ed25519_dalek` keys, or any other scheme that
//! fits the two traits below.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Digest size in bytes (SHA-256).
pub const DIGEST_SIZE: usize = 32;

/// Signature size in bytes (Ed25519).
pub const SIGNATURE_SIZE: usize = 64;

/// Signs package digests.
pub trait Sign: Send + Sync {
    fn sign(&self, digest: &[u8; DIGEST_SIZE]) -> [u8; SIGNATURE_SIZE];
}

/// Verifies package signatures.
pub trait Verify: Send + Sync {
    fn verify(&self, digest: &[u8; DIGEST_SIZE], signature: &[u8; SIGNATURE_SIZE]) -> bool;
}

impl Sign for SigningKey {
    fn sign(&self, digest: &[u8; DIGEST_SIZE]) -> [u8; SIGNATURE_SIZE] {
        ed25519_dalek::Signer::sign(self, digest).to_bytes()
    }
}

impl Verify for VerifyingKey {
    fn verify(&self, digest: &[u8; DIGEST_SIZE], signature: &[u8; SIGNATURE_SIZE]) -> bool {
        let signature = Signature::from_bytes(signature);
        ed25519_dalek::Verifier::verify(self, digest, &signature).is_ok()
    }
}

/// Hash a byte slice, returning a 32-byte SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
