//! Execution error taxonomy.
//!
//! Two categories matter to the main loop. *Execution errors* are
//! round-local: the round is rolled back, a warning is logged, and the
//! loop continues. *Critical errors* tear the layer down: rollback, then
//! propagate. [`ExecError::is_fatal`] draws the line.

use stratus_core::CodecError;
use stratus_transport::TransportError;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A transactional operation ran without an open transaction.
    #[error("no open transaction")]
    NoTransaction,

    /// Only one transaction may be open per storage instance.
    #[error("a transaction is already open")]
    TransactionBusy,

    /// CREATE of an OID that already exists.
    #[error("object already exists")]
    AlreadyExists,

    /// UPDATE or DELETE of a missing OID.
    #[error("object not found")]
    NotFound,

    /// The stored revision does not match the instruction's expectation.
    #[error("expected revision {expected}, found {found}")]
    RevisionMismatch { expected: u64, found: u64 },

    /// Attribute merge failed while applying an UPDATE.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The backend itself failed.
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Errors raised while executing sync rounds.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The instruction targets a revision older than the stored one.
    /// The round is dropped; synchronization continues.
    #[error("Instruction was late")]
    InstructionLate,

    /// Monotone order was lost: the instruction expects a future
    /// revision, or one newer than the round being executed.
    #[error("Synchronisation lost")]
    SynchronizationLost,

    /// Storage failed while committing a finished round.
    #[error("Finalization error; {0}")]
    Finalization(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The spawned layer task panicked or was aborted.
    #[error("execution task failed: {0}")]
    Task(String),
}

impl ExecError {
    /// Whether this error tears down the layer. Non-fatal errors drop
    /// the current round and the main loop continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            ExecError::InstructionLate => false,
            // Constraint violations inside a round are round-local;
            // infrastructure failures are not.
            ExecError::Storage(err) => matches!(
                err,
                StorageError::NoTransaction
                    | StorageError::TransactionBusy
                    | StorageError::Backend(_)
            ),
            // A package that parsed badly spoils its round only, but an
            // integrity failure on an accepted package is unrecoverable.
            ExecError::Codec(err) => matches!(err, CodecError::Verify(_) | CodecError::Sign(_)),
            ExecError::SynchronizationLost
            | ExecError::Finalization(_)
            | ExecError::Transport(_)
            | ExecError::Task(_) => true,
        }
    }
}
