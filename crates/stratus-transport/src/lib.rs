//! Stratus transport — connection-oriented transmit/receive pipeline
//! between instruction batches and a data-availability substrate.
//!
//! The substrate orders and timestamps submissions; this crate turns
//! local instruction batches into packages, submits them, and streams
//! received packages back as `(sync_round, Package)` pairs in substrate
//! order. Connections are short-lived and scoped; the [`Transport`]
//! hands out transmitter and receiver scopes and can close every live
//! connection at once.

pub mod connection;
pub mod da;
pub mod errors;
pub mod memory;
pub mod transport;
pub mod types;

pub use connection::{BlobStream, ConnState, Connection, ConnectionFactory, Lifecycle};
pub use da::{DaApi, DaBlob, DaClient, DaConnection, DaConnector, HeightStream, SubmitReceipt};
pub use errors::TransportError;
pub use memory::{MemoryConnection, MemoryConnector, MemoryHub};
pub use transport::{Receipt, Receiver, Transmitter, Transport};
pub use types::{height_of, round_of, BlobMeta, DaConfig, Namespace, RecvBlob, SyncRound};
