//! In-process loopback substrate for tests and local development.
//!
//! A [`MemoryHub`] plays the role of the DA network: every submitted
//! package occupies one round, and rounds are plain heights — no
//! composite encoding. Connections from the same hub see each other's
//! packages, so a transmitter and a receiver wired to one hub form a
//! complete loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::connection::{BlobStream, ConnState, Connection, ConnectionFactory, Lifecycle};
use crate::errors::TransportError;
use crate::types::{BlobMeta, Namespace, RecvBlob, SyncRound};

struct HubInner {
    ledger: Mutex<Vec<(Namespace, Bytes)>>,
    height: watch::Sender<u64>,
}

/// Shared round ledger standing in for a DA network.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                ledger: Mutex::new(Vec::new()),
                height: watch::Sender::new(0),
            }),
        }
    }

    /// Number of accepted rounds.
    pub fn len(&self) -> usize {
        self.inner.ledger.lock().expect("ledger lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A factory producing connections bound to this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { hub: self.clone() }
    }

    fn submit(&self, namespace: &Namespace, data: Bytes) -> SyncRound {
        let mut ledger = self.inner.ledger.lock().expect("ledger lock");
        ledger.push((namespace.clone(), data));
        let round = ledger.len() as u64;
        let _ = self.inner.height.send(round);
        round
    }

    fn get(&self, round: SyncRound) -> Option<(Namespace, Bytes)> {
        let ledger = self.inner.ledger.lock().expect("ledger lock");
        ledger.get(round.checked_sub(1)? as usize).cloned()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Connection`] over a [`MemoryHub`].
pub struct MemoryConnection {
    hub: MemoryHub,
    lifecycle: Lifecycle,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open(&self) -> Result<(), TransportError> {
        self.lifecycle.open()
    }

    fn close(&self) {
        self.lifecycle.close();
    }

    fn state(&self) -> ConnState {
        self.lifecycle.state()
    }

    async fn send_package(
        &self,
        namespace: &Namespace,
        package: Bytes,
    ) -> Result<SyncRound, TransportError> {
        self.lifecycle.ensure_open()?;
        Ok(self.hub.submit(namespace, package))
    }

    async fn recv_packages(
        &self,
        from: SyncRound,
        namespaces: &[Namespace],
    ) -> Result<BlobStream, TransportError> {
        self.lifecycle.ensure_open()?;
        if namespaces.is_empty() {
            return Err(TransportError::NoNamespace);
        }
        let hub = self.hub.clone();
        let mut closed = self.lifecycle.closed();
        let mut height_rx = hub.inner.height.subscribe();
        let namespaces = namespaces.to_vec();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut next = from.max(1);
            loop {
                let curr = *height_rx.borrow_and_update();
                while next <= curr {
                    if let Some((namespace, data)) = hub.get(next) {
                        if namespaces.contains(&namespace) {
                            let item = RecvBlob {
                                round: next,
                                data,
                                meta: BlobMeta {
                                    namespace,
                                    commitment: Bytes::new(),
                                    share_version: 0,
                                },
                            };
                            if tx.send(Ok(item)).await.is_err() {
                                return;
                            }
                        }
                    }
                    next += 1;
                }
                tokio::select! {
                    _ = closed.wait_for(|closed| *closed) => break,
                    _ = tx.closed() => break,
                    changed = height_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(BlobStream::new(rx))
    }
}

/// [`ConnectionFactory`] over a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryConnector {
    hub: MemoryHub,
}

impl ConnectionFactory for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self) -> Arc<MemoryConnection> {
        Arc::new(MemoryConnection {
            hub: self.hub.clone(),
            lifecycle: Lifecycle::new(),
        })
    }
}
