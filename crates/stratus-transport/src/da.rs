//! DA-network transport — maps packages onto namespaced blobs.
//!
//! Each package becomes a single blob under a caller-chosen namespace;
//! the composite sync round is `(block_height << 16) | blob_index`.
//! Reception subscribes to new headers and enumerates blobs per height,
//! restricted to the declared namespaces.
//!
//! The concrete node API (a Celestia light node, in the reference
//! deployment) stays behind [`DaClient`] / [`DaApi`]; this module only
//! assumes ordered heights and per-height blob enumeration.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::connection::{BlobStream, ConnState, Connection, ConnectionFactory, Lifecycle};
use crate::errors::TransportError;
use crate::types::{height_of, round_of, BlobMeta, DaConfig, Namespace, RecvBlob, SyncRound};

/// A blob as stored on the DA network.
#[derive(Debug, Clone)]
pub struct DaBlob {
    pub namespace: Namespace,
    pub data: Bytes,
    /// Position of the blob within its block.
    pub index: u64,
    pub commitment: Bytes,
    pub share_version: u32,
}

/// Result of a blob submission: the block it landed in and the
/// commitment to fetch it back by.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub height: u64,
    pub commitment: Bytes,
}

/// Stream of block heights observed via header subscription.
pub type HeightStream = BoxStream<'static, Result<u64, TransportError>>;

/// Session surface of a DA node.
#[async_trait]
pub trait DaApi: Send + Sync + 'static {
    /// Submit one blob; resolves when the blob is included in a block.
    async fn submit_blob(
        &self,
        namespace: &Namespace,
        data: Bytes,
    ) -> Result<SubmitReceipt, TransportError>;

    /// Fetch a single blob by commitment, learning its in-block index.
    async fn get_blob(
        &self,
        height: u64,
        namespace: &Namespace,
        commitment: &Bytes,
    ) -> Result<DaBlob, TransportError>;

    /// All blobs at `height` in the given namespaces, in index order.
    async fn get_all_blobs(
        &self,
        height: u64,
        namespaces: &[Namespace],
    ) -> Result<Vec<DaBlob>, TransportError>;

    /// Subscribe to new block heights.
    async fn subscribe_heights(&self) -> Result<HeightStream, TransportError>;
}

/// Opens node sessions. One session backs one connection.
#[async_trait]
pub trait DaClient: Send + Sync + 'static {
    type Api: DaApi;

    async fn connect(&self, config: &DaConfig) -> Result<Self::Api, TransportError>;
}

// ── Connection ────────────────────────────────────────────────────────────────

/// A [`Connection`] over a DA node session.
pub struct DaConnection<C: DaClient> {
    client: Arc<C>,
    config: DaConfig,
    lifecycle: Lifecycle,
    api: Mutex<Option<Arc<C::Api>>>,
}

impl<C: DaClient> DaConnection<C> {
    fn new(client: Arc<C>, config: DaConfig) -> Self {
        Self {
            client,
            config,
            lifecycle: Lifecycle::new(),
            api: Mutex::new(None),
        }
    }

    fn api(&self) -> Result<Arc<C::Api>, TransportError> {
        self.lifecycle.ensure_open()?;
        self.api
            .lock()
            .expect("api lock")
            .clone()
            .ok_or(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl<C: DaClient> Connection for DaConnection<C> {
    async fn open(&self) -> Result<(), TransportError> {
        self.lifecycle.open()?;
        match self.client.connect(&self.config).await {
            Ok(api) => {
                *self.api.lock().expect("api lock") = Some(Arc::new(api));
                Ok(())
            }
            Err(err) => {
                self.lifecycle.close();
                Err(err)
            }
        }
    }

    fn close(&self) {
        self.lifecycle.close();
        self.api.lock().expect("api lock").take();
    }

    fn state(&self) -> ConnState {
        self.lifecycle.state()
    }

    async fn send_package(
        &self,
        namespace: &Namespace,
        package: Bytes,
    ) -> Result<SyncRound, TransportError> {
        let api = self.api()?;
        let receipt = api.submit_blob(namespace, package).await?;
        let blob = api
            .get_blob(receipt.height, namespace, &receipt.commitment)
            .await?;
        let round = round_of(receipt.height, blob.index);
        tracing::debug!(
            height = receipt.height,
            index = blob.index,
            namespace = %namespace,
            "blob accepted"
        );
        Ok(round)
    }

    async fn recv_packages(
        &self,
        from: SyncRound,
        namespaces: &[Namespace],
    ) -> Result<BlobStream, TransportError> {
        if namespaces.is_empty() {
            return Err(TransportError::NoNamespace);
        }
        let api = self.api()?;
        let mut heights = api.subscribe_heights().await?;
        let mut closed = self.lifecycle.closed();
        let namespaces = namespaces.to_vec();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut from_height = height_of(from);
            loop {
                let closed_fut = async {
                    loop {
                        if *closed.borrow() {
                            return;
                        }
                        if closed.changed().await.is_err() {
                            return;
                        }
                    }
                };
                let curr_height = tokio::select! {
                    _ = closed_fut => break,
                    _ = tx.closed() => break,
                    next = heights.next() => match next {
                        Some(Ok(height)) => height,
                        Some(Err(err)) => {
                            let _ = tx.send(Err(err)).await;
                            break;
                        }
                        None => break,
                    },
                };
                // Catch up every height through the observed head, then
                // resume at head + 1. Height 0 holds no blobs.
                while from_height <= curr_height {
                    if from_height > 0 {
                        let blobs = match api.get_all_blobs(from_height, &namespaces).await {
                            Ok(blobs) => blobs,
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                        };
                        for blob in blobs {
                            let item = RecvBlob {
                                round: round_of(from_height, blob.index),
                                data: blob.data,
                                meta: BlobMeta {
                                    namespace: blob.namespace,
                                    commitment: blob.commitment,
                                    share_version: blob.share_version,
                                },
                            };
                            if tx.send(Ok(item)).await.is_err() {
                                return;
                            }
                        }
                    }
                    from_height += 1;
                }
            }
        });
        Ok(BlobStream::new(rx))
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// [`ConnectionFactory`] binding a transport to a DA node.
pub struct DaConnector<C: DaClient> {
    client: Arc<C>,
    config: DaConfig,
}

impl<C: DaClient> DaConnector<C> {
    pub fn new(client: C, config: DaConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }
}

impl<C: DaClient> ConnectionFactory for DaConnector<C> {
    type Conn = DaConnection<C>;

    fn connect(&self) -> Arc<DaConnection<C>> {
        Arc::new(DaConnection::new(self.client.clone(), self.config.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
