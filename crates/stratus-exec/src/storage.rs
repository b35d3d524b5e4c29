//! Transacted storage — revision-tracked state with a transactional
//! discipline.
//!
//! The canonical state maps `oid → (revision, value)`, where an object's
//! revision is the sync round that last mutated it. A sync round runs
//! against a working copy installed by `begin_transaction`; `commit`
//! swaps it in atomically and `rollback` discards it. Reads outside the
//! transactional surface always see canonical state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stratus_core::{Entity, Instruction, Payload};
use stratus_transport::SyncRound;

use crate::errors::StorageError;

/// Non-transactional read surface of the distributed state.
#[async_trait]
pub trait Storage: Send + Sync {
    type Entity: Entity;

    /// The last accepted sync round, or 0 before any synchronization.
    async fn get_last_round(&self) -> Result<SyncRound, StorageError>;

    /// Revision of the object named by `oid`, or 0 when absent.
    async fn get_revision_for(
        &self,
        oid: &<Self::Entity as Entity>::Oid,
    ) -> Result<SyncRound, StorageError>;

    /// True iff any stored object's revision equals `sync_round`.
    async fn round_accepted(&self, sync_round: SyncRound) -> Result<bool, StorageError>;
}

/// Transactional surface. Only one transaction may be open per storage
/// instance at a time.
#[async_trait]
pub trait TransactedStorage: Storage {
    /// Install a working copy of the state for `sync_round`.
    async fn begin_transaction(&self, sync_round: SyncRound) -> Result<(), StorageError>;

    /// Apply one instruction to the working copy, according to its
    /// derived method.
    async fn finalize_instruction(
        &self,
        instruction: &Instruction<Self::Entity>,
    ) -> Result<(), StorageError>;

    /// Swap the working copy into the canonical state.
    async fn commit_transaction(&self) -> Result<(), StorageError>;

    /// Discard the working copy. Idempotent.
    async fn rollback_transaction(&self) -> Result<(), StorageError>;
}

// ── In-memory implementation ──────────────────────────────────────────────────

struct Txn<E: Entity> {
    sync_round: SyncRound,
    working: HashMap<E::Oid, (SyncRound, E)>,
}

struct Inner<E: Entity> {
    canonical: HashMap<E::Oid, (SyncRound, E)>,
    txn: Option<Txn<E>>,
}

/// Copy-on-write in-memory [`TransactedStorage`].
///
/// `begin_transaction` clones the canonical map; the clone absorbs the
/// round's instructions and replaces the canonical map on commit.
pub struct MemoryStorage<E: Entity> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E: Entity> Clone for MemoryStorage<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Entity> MemoryStorage<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                canonical: HashMap::new(),
                txn: None,
            })),
        }
    }

    /// Canonical value and revision of `oid`.
    pub fn get(&self, oid: &E::Oid) -> Option<(SyncRound, E)> {
        self.inner
            .lock()
            .expect("state lock")
            .canonical
            .get(oid)
            .cloned()
    }

    /// Snapshot of the canonical state.
    pub fn snapshot(&self) -> HashMap<E::Oid, (SyncRound, E)> {
        self.inner.lock().expect("state lock").canonical.clone()
    }

    /// True while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().expect("state lock").txn.is_some()
    }
}

impl<E: Entity> Default for MemoryStorage<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Storage for MemoryStorage<E> {
    type Entity = E;

    async fn get_last_round(&self) -> Result<SyncRound, StorageError> {
        let inner = self.inner.lock().expect("state lock");
        Ok(inner
            .canonical
            .values()
            .map(|(revision, _)| *revision)
            .max()
            .unwrap_or(0))
    }

    async fn get_revision_for(&self, oid: &E::Oid) -> Result<SyncRound, StorageError> {
        let inner = self.inner.lock().expect("state lock");
        Ok(inner
            .canonical
            .get(oid)
            .map(|(revision, _)| *revision)
            .unwrap_or(0))
    }

    async fn round_accepted(&self, sync_round: SyncRound) -> Result<bool, StorageError> {
        let inner = self.inner.lock().expect("state lock");
        Ok(inner
            .canonical
            .values()
            .any(|(revision, _)| *revision == sync_round))
    }
}

#[async_trait]
impl<E: Entity> TransactedStorage for MemoryStorage<E> {
    async fn begin_transaction(&self, sync_round: SyncRound) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("state lock");
        if inner.txn.is_some() {
            return Err(StorageError::TransactionBusy);
        }
        inner.txn = Some(Txn {
            sync_round,
            working: inner.canonical.clone(),
        });
        Ok(())
    }

    async fn finalize_instruction(
        &self,
        instruction: &Instruction<E>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("state lock");
        let txn = inner.txn.as_mut().ok_or(StorageError::NoTransaction)?;
        let sync_round = txn.sync_round;
        match instruction.payload() {
            Payload::Entity(entity) => {
                if txn.working.contains_key(instruction.oid()) {
                    return Err(StorageError::AlreadyExists);
                }
                txn.working
                    .insert(instruction.oid().clone(), (sync_round, entity.clone()));
            }
            Payload::Attrs(attrs) => {
                let (revision, value) = txn
                    .working
                    .get(instruction.oid())
                    .ok_or(StorageError::NotFound)?;
                if *revision != instruction.revision() {
                    return Err(StorageError::RevisionMismatch {
                        expected: instruction.revision(),
                        found: *revision,
                    });
                }
                let revised = value.merge(attrs)?;
                txn.working
                    .insert(instruction.oid().clone(), (sync_round, revised));
            }
            Payload::None => {
                let (revision, _) = txn
                    .working
                    .get(instruction.oid())
                    .ok_or(StorageError::NotFound)?;
                if *revision != instruction.revision() {
                    return Err(StorageError::RevisionMismatch {
                        expected: instruction.revision(),
                        found: *revision,
                    });
                }
                txn.working.remove(instruction.oid());
            }
        }
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("state lock");
        let txn = inner.txn.take().ok_or(StorageError::NoTransaction)?;
        inner.canonical = txn.working;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), StorageError> {
        self.inner.lock().expect("state lock").txn = None;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
