//! Codec error taxonomy.

use thiserror::Error;

/// Errors raised while serializing, deserializing, or verifying
/// instructions and packages.
///
/// `Verify` marks an integrity failure — the bytes parsed but the digest
/// or signature does not hold. Consumers treat it as a different category
/// from a plain `Deserialize` failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{0}")]
    Serialize(String),

    #[error("{0}")]
    Deserialize(String),

    #[error("{0}")]
    Verify(String),

    #[error("{0}")]
    Sign(String),
}

impl CodecError {
    pub fn serialize(msg: impl Into<String>) -> Self {
        Self::Serialize(msg.into())
    }

    pub fn deserialize(msg: impl Into<String>) -> Self {
        Self::Deserialize(msg.into())
    }

    pub fn verify(msg: impl Into<String>) -> Self {
        Self::Verify(msg.into())
    }

    pub fn sign(msg: impl Into<String>) -> Self {
        Self::Sign(msg.into())
    }
}
