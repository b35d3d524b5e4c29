//! Stratus execution layer — rebuilds local state from received
//! instruction packages.
//!
//! For every package the transport yields, the layer runs one
//! transactional *sync round*: deserialize, validate revision
//! monotonicity, apply each instruction to a transacted storage, and
//! commit-or-rollback atomically. Rounds are strictly serial and follow
//! substrate order.

pub mod errors;
pub mod layer;
pub mod storage;

pub use errors::{ExecError, StorageError};
pub use layer::{check_instruction, Layer, Running};
pub use storage::{MemoryStorage, Storage, TransactedStorage};
