//! Concurrency primitives for SharpCoreDB (`spec.md` §5): the writer-fair
//! registry/FSM lock, per-block write locks for conflict detection,
//! transaction handles, and cooperative cancellation for long-running
//! maintenance operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancellation;
pub mod lock;
pub mod lock_table;
pub mod txn;

pub use cancellation::{Cancelled, CancellationToken, ChunkPacer};
pub use lock::FairRwLock;
pub use lock_table::LockTable;
pub use txn::{Transaction, TxnId, TxnState};
