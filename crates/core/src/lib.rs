//! Shared types and error taxonomy for SharpCoreDB.
//!
//! This crate has no knowledge of files, encryption, or WAL segments — it is
//! the leaf crate every other SharpCoreDB crate depends on, the way the
//! teacher's `strata-core` underlies its whole workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod types;

pub use error::{Error, Result, Severity};
pub use types::{BlobId, BlockName, Checksum, FilePointer, RowTier, StorageRef, Version};
