//! Shared transport vocabulary — sync rounds, namespaces, blob metadata.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A monotone integer identifying an accepted package's position in
/// substrate order.
///
/// The DA-backed transport composes `(height << 16) | blob_index`,
/// admitting up to 65536 packages per block; plain height-based
/// orderings (the loopback substrate) fit the same type.
pub type SyncRound = u64;

/// Compose a sync round from a block height and a blob index.
pub fn round_of(height: u64, index: u64) -> SyncRound {
    (height << 16) | (index & 0xFFFF)
}

/// The block height a composite sync round belongs to.
pub fn height_of(round: SyncRound) -> u64 {
    round >> 16
}

/// Opaque tag partitioning blobs on the substrate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Bytes);

impl Namespace {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Substrate-side details accompanying a received blob.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub namespace: Namespace,
    pub commitment: Bytes,
    pub share_version: u32,
}

/// One received package blob, in substrate order.
#[derive(Debug, Clone)]
pub struct RecvBlob {
    pub round: SyncRound,
    pub data: Bytes,
    pub meta: BlobMeta,
}

/// Connection settings for a DA node session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaConfig {
    /// Node RPC endpoint.
    pub url: String,
    /// Bearer token presented when opening the session.
    pub auth_token: Option<String>,
    /// Per-request response timeout, in seconds.
    pub response_timeout_secs: u64,
}

impl DaConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for DaConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:26658".to_owned(),
            auth_token: None,
            response_timeout_secs: 180,
        }
    }
}
