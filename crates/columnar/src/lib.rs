//! Columnar segment format and codec (`spec.md` §4.9, component C9).
//!
//! Operates purely on in-memory buffers — no knowledge of the block store
//! or file layout — so it can encode/decode a column standing alone (a
//! `.col` file) or as a block inside an SCDB file with identical bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod segment;
pub mod stats;
pub mod value;

pub use encoding::{select_encoding, Encoding};
pub use segment::{column_stats, decode_column, decode_table, encode_column, encode_table, ColumnMeta};
pub use stats::{ColumnStats, Histogram, RelOp, Scalar};
pub use value::{ColumnType, ColumnValues, NullBitmap};
