//! SharpCoreDB's storage engine: the facade (C7), the row-overflow tier
//! and external blob files (C8), wired on top of `sharpcore-storage`,
//! `sharpcore-durability`, and `sharpcore-concurrency`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod blob;
mod db;
mod orphans;
mod overflow;

pub use blob::BlobStore;
pub use db::Database;
pub use orphans::{clean, now_unix, scan, Missing, Orphan, ScanReport};
pub use overflow::{select_tier, OverflowChain};
