//! Transport — pool of live connections plus the two scoped factories.
//!
//! A [`Transmitter`] collects instructions and submits them as one
//! package when the scope finishes; a [`Receiver`] streams received
//! packages back in substrate order. Both own their connection and
//! release it on every exit path, including drop. `Transport::close`
//! reaches into every live scope: in-flight sends fail, receive streams
//! end.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use stratus_core::{Instruction, InstructionCodec, Package, Sign};

use crate::connection::{Connection, ConnectionFactory};
use crate::errors::TransportError;
use crate::types::{Namespace, SyncRound};

type Pool<C> = Arc<DashMap<u64, Arc<C>>>;

/// Transport over a concrete substrate, generic in the connection
/// factory and the entity type packages decode into.
pub struct Transport<F: ConnectionFactory, E> {
    factory: F,
    pool: Pool<F::Conn>,
    next_id: AtomicU64,
    closed: AtomicBool,
    signer: Option<Arc<dyn Sign>>,
    _entity: PhantomData<fn() -> E>,
}

impl<F: ConnectionFactory, E: InstructionCodec> Transport<F, E> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            pool: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            signer: None,
            _entity: PhantomData,
        }
    }

    /// Sign every outgoing package with `signer`.
    pub fn with_signer(mut self, signer: Arc<dyn Sign>) -> Self {
        self.signer = Some(signer);
        self
    }

    async fn checkout(&self) -> Result<(u64, Arc<F::Conn>), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        let conn = self.factory.connect();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pool.insert(id, conn.clone());
        // A close() racing this open wins: either it already closed the
        // pooled connection, failing the open, or the re-check below
        // releases the stray connection.
        if let Err(err) = conn.open().await {
            self.pool.remove(&id);
            return Err(err);
        }
        if self.closed.load(Ordering::Acquire) {
            conn.close();
            self.pool.remove(&id);
            return Err(TransportError::ConnectionClosed);
        }
        Ok((id, conn))
    }

    /// Open a transmitter scope: collect instructions, then
    /// [`Transmitter::send`] them as a single package under `namespace`.
    pub async fn transmitter(
        &self,
        namespace: Namespace,
    ) -> Result<Transmitter<F, E>, TransportError> {
        let (id, conn) = self.checkout().await?;
        Ok(Transmitter {
            conn,
            pool: self.pool.clone(),
            id,
            namespace,
            signer: self.signer.clone(),
            instructions: Vec::new(),
        })
    }

    /// Open a receiver scope streaming `(sync_round, Package)` pairs in
    /// the given namespaces, starting at sync round `from`.
    pub async fn receiver(
        &self,
        from: SyncRound,
        namespaces: &[Namespace],
    ) -> Result<Receiver<F, E>, TransportError> {
        let (id, conn) = self.checkout().await?;
        match conn.recv_packages(from, namespaces).await {
            Ok(stream) => Ok(Receiver {
                conn,
                pool: self.pool.clone(),
                id,
                stream,
                _entity: PhantomData,
            }),
            Err(err) => {
                conn.close();
                self.pool.remove(&id);
                Err(err)
            }
        }
    }

    /// Close every live connection and refuse new scopes. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for entry in self.pool.iter() {
            entry.value().close();
        }
        self.pool.clear();
    }

    /// Number of connections currently held by scopes.
    pub fn live_connections(&self) -> usize {
        self.pool.len()
    }
}

// ── Transmitter ───────────────────────────────────────────────────────────────

/// Summary of a completed transmission.
#[derive(Debug, Clone, Copy)]
pub struct Receipt {
    /// Round the package was accepted in.
    pub sync_round: SyncRound,
    /// Number of instructions the package carried.
    pub sent_count: usize,
}

/// Scoped instruction collector bound to one connection.
///
/// Dropping an unsent transmitter abandons the batch and releases the
/// connection; nothing reaches the substrate.
pub struct Transmitter<F: ConnectionFactory, E: stratus_core::Entity> {
    conn: Arc<F::Conn>,
    pool: Pool<F::Conn>,
    id: u64,
    namespace: Namespace,
    signer: Option<Arc<dyn Sign>>,
    instructions: Vec<Instruction<E>>,
}

impl<F: ConnectionFactory, E: InstructionCodec> Transmitter<F, E> {
    /// Add an instruction to the outgoing batch.
    pub fn push(&mut self, instruction: Instruction<E>) {
        self.instructions.push(instruction);
    }

    /// Number of instructions collected so far.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Build one package from the collected instructions and submit it.
    /// The connection is released on every path.
    pub async fn send(self) -> Result<Receipt, TransportError> {
        let package = Package::build(&self.instructions, self.signer.as_deref())?;
        let sync_round = self
            .conn
            .send_package(&self.namespace, package.into_bytes())
            .await?;
        let receipt = Receipt {
            sync_round,
            sent_count: self.instructions.len(),
        };
        tracing::debug!(
            sync_round = receipt.sync_round,
            count = receipt.sent_count,
            "instructions sent"
        );
        Ok(receipt)
    }
}

impl<F: ConnectionFactory, E: stratus_core::Entity> Drop for Transmitter<F, E> {
    fn drop(&mut self) {
        self.conn.close();
        self.pool.remove(&self.id);
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// Scoped package stream bound to one connection.
///
/// Ends cleanly (`None`) when the connection or the owning transport
/// closes. Dropping the receiver releases the connection.
pub struct Receiver<F: ConnectionFactory, E> {
    conn: Arc<F::Conn>,
    pool: Pool<F::Conn>,
    id: u64,
    stream: crate::connection::BlobStream,
    _entity: PhantomData<fn() -> E>,
}

impl<F: ConnectionFactory, E> Receiver<F, E> {
    /// The next received package, in strict sync-round order.
    pub async fn next(&mut self) -> Option<Result<(SyncRound, Package<E>), TransportError>> {
        match self.stream.next().await? {
            Ok(blob) => Some(Ok((blob.round, Package::open(blob.data)))),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<F: ConnectionFactory, E> Drop for Receiver<F, E> {
    fn drop(&mut self) {
        self.conn.close();
        self.pool.remove(&self.id);
    }
}
