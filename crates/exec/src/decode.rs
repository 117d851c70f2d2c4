//! Bridges a columnar segment into the shape the kernels in
//! [`crate::kernels`] expect: a fully decoded [`ColumnValues`] plus its
//! [`NullBitmap`]. Delta/dictionary/run-length columns are reconstructed to
//! raw values here, once, rather than letting a kernel compute on the
//! encoded form (`spec.md` §4.10's vectorization rules).

use sharpcore_columnar::{decode_column, ColumnValues, NullBitmap};
use sharpcore_core::Result;

/// Decode a single-column segment for use by the kernels in this crate.
pub fn decode_for_kernels(segment_bytes: &[u8]) -> Result<(ColumnValues, NullBitmap)> {
    decode_column(segment_bytes)
}
