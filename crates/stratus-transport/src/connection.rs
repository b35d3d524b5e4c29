//! Connection contract — a single substrate session.
//!
//! Connections are short-lived, scoped to one transmit or receive
//! session, and move through `New → Open → Closed` exactly once. Opening
//! is only legal from `New`; closing is idempotent from any state; send
//! and receive are only legal while `Open`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::errors::TransportError;
use crate::types::{Namespace, RecvBlob, SyncRound};

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    New = 0,
    Open = 1,
    Closed = 2,
}

/// Atomic lifecycle tracker shared by connection implementations.
///
/// Carries the close signal that receive feeders select on, so a
/// `close()` from another task promptly ends in-flight streams.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    closed_tx: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnState::New as u8),
            closed_tx: watch::Sender::new(false),
        }
    }

    pub fn state(&self) -> ConnState {
        match self.state.load(Ordering::Acquire) {
            0 => ConnState::New,
            1 => ConnState::Open,
            _ => ConnState::Closed,
        }
    }

    /// Transition `New → Open`. Fails when the connection was already
    /// opened or closed — connections are never reused.
    pub fn open(&self) -> Result<(), TransportError> {
        self.state
            .compare_exchange(
                ConnState::New as u8,
                ConnState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(())
    }

    /// Transition to `Closed` from any state. Idempotent.
    pub fn close(&self) {
        self.state.store(ConnState::Closed as u8, Ordering::Release);
        let _ = self.closed_tx.send(true);
    }

    pub fn ensure_open(&self) -> Result<(), TransportError> {
        match self.state() {
            ConnState::Open => Ok(()),
            _ => Err(TransportError::ConnectionClosed),
        }
    }

    /// A receiver resolving once the connection closes.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// A single substrate session able to submit package blobs and stream
/// them back in sync-round order.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Establish the session. Legal only from `New`.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the session. Idempotent; in-flight sends fail with
    /// [`TransportError::ConnectionClosed`] and receive streams end
    /// cleanly.
    fn close(&self);

    fn state(&self) -> ConnState;

    /// Submit one package blob under `namespace`; returns the sync round
    /// the substrate accepted it in.
    async fn send_package(
        &self,
        namespace: &Namespace,
        package: Bytes,
    ) -> Result<SyncRound, TransportError>;

    /// Stream package blobs in the given namespaces, starting at sync
    /// round `from`, in strict round order without gaps or duplicates.
    async fn recv_packages(
        &self,
        from: SyncRound,
        namespaces: &[Namespace],
    ) -> Result<BlobStream, TransportError>;
}

/// Binds a transport to a concrete substrate.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Connection;

    /// A fresh, unopened connection.
    fn connect(&self) -> Arc<Self::Conn>;
}

// ── BlobStream ────────────────────────────────────────────────────────────────

/// Channel-fed stream of received blobs.
///
/// Fed by a cooperative task owned by the connection; ends (`None`)
/// when the connection closes or the feeder finishes. Substrate
/// failures surface as `Err` items.
pub struct BlobStream {
    rx: mpsc::Receiver<Result<RecvBlob, TransportError>>,
}

impl BlobStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<RecvBlob, TransportError>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Result<RecvBlob, TransportError>> {
        self.rx.recv().await
    }
}
