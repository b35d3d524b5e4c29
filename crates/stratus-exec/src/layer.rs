//! Execution layer — binds a transport to a transacted storage and
//! drives the main synchronization loop.
//!
//! Packages arrive in substrate order; each one becomes a sync round.
//! A round that fails an execution check is rolled back and logged, and
//! the loop moves on; a critical failure rolls back and propagates.

use std::sync::Arc;

use stratus_core::{Instruction, InstructionCodec, Package};
use stratus_transport::{ConnectionFactory, Namespace, SyncRound, Transport};

use crate::errors::ExecError;
use crate::storage::{Storage, TransactedStorage};

/// Validate an instruction against the current round and the canonical
/// state, before finalization.
///
/// An instruction must address the past (`revision < sync_round`) and
/// match the stored revision exactly: a stored revision below the
/// expectation means order was lost; above it, the instruction is late
/// and only its round is dropped.
pub async fn check_instruction<S: Storage>(
    storage: &S,
    sync_round: SyncRound,
    instruction: &Instruction<S::Entity>,
) -> Result<(), ExecError> {
    if instruction.revision() >= sync_round {
        return Err(ExecError::SynchronizationLost);
    }
    let revision = storage.get_revision_for(instruction.oid()).await?;
    if revision < instruction.revision() {
        Err(ExecError::SynchronizationLost)
    } else if revision > instruction.revision() {
        Err(ExecError::InstructionLate)
    } else {
        Ok(())
    }
}

/// The execution layer for state-changing instructions.
pub struct Layer<F, S>
where
    F: ConnectionFactory,
    S: TransactedStorage,
{
    transport: Arc<Transport<F, S::Entity>>,
    storage: S,
}

impl<F, S> Layer<F, S>
where
    F: ConnectionFactory,
    S: TransactedStorage + 'static,
    S::Entity: InstructionCodec,
{
    pub fn new(transport: Arc<Transport<F, S::Entity>>, storage: S) -> Self {
        Self { transport, storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Drive the main loop until the transport closes.
    ///
    /// Resumes after the last accepted round, then executes one sync
    /// round per received package. Returns when the receive stream ends
    /// — a transport-initiated close is not an error — or propagates the
    /// first critical failure.
    pub async fn run(&self, namespaces: &[Namespace]) -> Result<(), ExecError> {
        let from = self.storage.get_last_round().await? + 1;
        let mut receiver = self.transport.receiver(from, namespaces).await?;
        while let Some(item) = receiver.next().await {
            let (sync_round, package) = item?;
            self.run_round(sync_round, &package).await?;
        }
        Ok(())
    }

    /// Execute one sync round transactionally.
    async fn run_round(
        &self,
        sync_round: SyncRound,
        package: &Package<S::Entity>,
    ) -> Result<(), ExecError> {
        self.storage.begin_transaction(sync_round).await?;
        match self.apply_package(sync_round, package).await {
            Ok(count) => {
                self.storage
                    .commit_transaction()
                    .await
                    .map_err(ExecError::Finalization)?;
                tracing::debug!(sync_round, count, "sync round finalized");
                Ok(())
            }
            Err(err) => {
                self.storage.rollback_transaction().await?;
                if err.is_fatal() {
                    Err(err)
                } else {
                    tracing::warn!("Sync round# {sync_round}; dropped by error: {err}");
                    Ok(())
                }
            }
        }
    }

    async fn apply_package(
        &self,
        sync_round: SyncRound,
        package: &Package<S::Entity>,
    ) -> Result<usize, ExecError> {
        let mut count = 0;
        for item in package.deserialize() {
            let instruction = item?;
            check_instruction(&self.storage, sync_round, &instruction).await?;
            self.storage.finalize_instruction(&instruction).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Run the layer in a background task.
    ///
    /// [`Running::stop`] closes the transport, which ends the receive
    /// stream cleanly; the round in flight finishes (commit or rollback)
    /// before the task returns, so no partial state escapes.
    pub fn spawn(self, namespaces: Vec<Namespace>) -> Running<F, S::Entity> {
        let transport = self.transport.clone();
        let handle = tokio::spawn(async move { self.run(&namespaces).await });
        Running { transport, handle }
    }
}

/// Handle to a spawned [`Layer`].
pub struct Running<F: ConnectionFactory, E> {
    transport: Arc<Transport<F, E>>,
    handle: tokio::task::JoinHandle<Result<(), ExecError>>,
}

impl<F: ConnectionFactory, E: InstructionCodec> Running<F, E> {
    /// Signal shutdown and wait for the loop to finish.
    pub async fn stop(self) -> Result<(), ExecError> {
        self.transport.close();
        self.join().await
    }

    /// Wait for the loop to finish without closing the transport.
    pub async fn join(self) -> Result<(), ExecError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(ExecError::Task(err.to_string())),
        }
    }
}
