//! Write-ahead logging and crash recovery for SharpCoreDB (`spec.md` §4.6,
//! component C6).
//!
//! Every block write is expected to reach the data file only after the
//! `WalWriter` has durably recorded it (per `mode`); on reopen,
//! [`reader::build_replay_plan`] turns a raw WAL region back into the set
//! of writes that are safe to redo.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod frame;
pub mod reader;
pub mod record;
pub mod writer;

pub use checkpoint::CheckpointTrigger;
pub use frame::looks_like_wal_segment;
pub use reader::{build_replay_plan, expected_checksums, redo_writes, RedoWrite, ReplayPlan};
pub use record::{RecordKind, TxnId, WalRecord};
pub use writer::{DurabilityMode, WalWriter};
