//! Transport error taxonomy.

use stratus_core::CodecError;
use thiserror::Error;

/// Errors raised while talking to the supporting platform.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed, was never opened, or was reused.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A receive scope needs at least one namespace.
    #[error("no namespace given")]
    NoNamespace,

    /// The supporting platform rejected or failed an operation.
    #[error("platform failure: {0}")]
    Platform(String),

    /// Package build failed while sending.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }
}
