//! Typed column buffers and their NULL bitmaps (`spec.md` §4.9).

use sharpcore_core::{Error, Result};

/// The scalar type a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Signed 64-bit integer.
    Int64,
    /// IEEE-754 double.
    Float64,
    /// UTF-8 text.
    Text,
}

/// A column's values, one variant per [`ColumnType`]. A `NULL` slot still
/// occupies a position in the vector; its value is a type-appropriate
/// placeholder and must never be trusted — only [`NullBitmap::is_null`]
/// tells the truth.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Int64 values, one per row.
    Int64(Vec<i64>),
    /// Float64 values, one per row.
    Float64(Vec<f64>),
    /// Text values, one per row.
    Text(Vec<String>),
}

impl ColumnValues {
    /// The type tag for this column.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Int64(_) => ColumnType::Int64,
            ColumnValues::Float64(_) => ColumnType::Float64,
            ColumnValues::Text(_) => ColumnType::Text,
        }
    }

    /// Number of rows (including NULLs).
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    /// Whether this column has zero rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A bit-packed NULL mask: one bit per row, `1` meaning the row is NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullBitmap {
    bits: Vec<u8>,
    len: usize,
}

impl NullBitmap {
    /// Build a bitmap with every row present (no NULLs).
    pub fn none_null(len: usize) -> Self {
        NullBitmap {
            bits: vec![0u8; len.div_ceil_compat(8)],
            len,
        }
    }

    /// Build a bitmap from an explicit `is_null` flag per row.
    pub fn from_flags(flags: &[bool]) -> Self {
        let mut bitmap = NullBitmap::none_null(flags.len());
        for (i, &is_null) in flags.iter().enumerate() {
            if is_null {
                bitmap.set_null(i);
            }
        }
        bitmap
    }

    /// Number of rows this bitmap covers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this bitmap covers zero rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether row `i` is NULL.
    pub fn is_null(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        (self.bits[i / 8] >> (i % 8)) & 1 == 1
    }

    /// Mark row `i` as NULL.
    pub fn set_null(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.bits[i / 8] |= 1 << (i % 8);
    }

    /// Count of non-NULL rows.
    pub fn non_null_count(&self) -> usize {
        self.len - self.null_count()
    }

    /// Count of NULL rows.
    pub fn null_count(&self) -> usize {
        (0..self.len).filter(|&i| self.is_null(i)).count()
    }

    /// Raw packed bytes, for on-disk framing.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Rebuild a bitmap from its packed bytes and a row count.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self> {
        let expected = len.div_ceil_compat(8);
        if bytes.len() != expected {
            return Err(Error::FormatError(format!(
                "null bitmap expected {expected} bytes for {len} rows, found {}",
                bytes.len()
            )));
        }
        Ok(NullBitmap {
            bits: bytes.to_vec(),
            len,
        })
    }
}

trait DivCeilCompat {
    fn div_ceil_compat(self, rhs: usize) -> usize;
}

impl DivCeilCompat for usize {
    // Hand-rolled ceiling division: `usize::div_ceil` only stabilized in
    // Rust 1.73, past this workspace's 1.70 MSRV.
    fn div_ceil_compat(self, rhs: usize) -> usize {
        (self + rhs - 1) / rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_null_reports_no_nulls() {
        let bitmap = NullBitmap::none_null(10);
        assert_eq!(bitmap.null_count(), 0);
        assert_eq!(bitmap.non_null_count(), 10);
    }

    #[test]
    fn set_null_is_observed() {
        let mut bitmap = NullBitmap::none_null(3);
        bitmap.set_null(1);
        assert!(!bitmap.is_null(0));
        assert!(bitmap.is_null(1));
        assert!(!bitmap.is_null(2));
        assert_eq!(bitmap.null_count(), 1);
    }

    #[test]
    fn round_trips_through_bytes() {
        let bitmap = NullBitmap::from_flags(&[false, true, true, false, false, true, false, false, true]);
        let restored = NullBitmap::from_bytes(bitmap.as_bytes(), bitmap.len()).unwrap();
        assert_eq!(bitmap, restored);
    }
}
