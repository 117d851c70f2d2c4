//! SIMD execution kernels (`spec.md` §4.10, component C10).
//!
//! Every kernel here takes an already-decoded [`ColumnValues`] buffer and
//! its [`NullBitmap`] — for an encoded column, decode it first via
//! [`crate::decode_for_kernels`]; this core never computes on the encoded
//! form directly.
//!
//! There is no architecture-specific intrinsic path. The "vector" path
//! below is a chunked, unrolled scalar loop: it processes
//! [`LANES`]-wide groups with independent accumulators so the compiler can
//! autovectorize it, and is switched to only when the input is at least
//! [`SIMD_SCALAR_FALLBACK_THRESHOLD`] elements, matching the spec's
//! "fall back to scalar below 128 elements" rule. Below that size the
//! per-lane bookkeeping costs more than it saves.

use sharpcore_columnar::{ColumnValues, NullBitmap, RelOp, Scalar};
use sharpcore_core::limits::SIMD_SCALAR_FALLBACK_THRESHOLD;
use sharpcore_core::{Error, Result};

/// Width of the chunked accumulation loop; not tied to any real hardware
/// vector register, just wide enough to give the compiler independent
/// accumulators to interleave.
const LANES: usize = 8;

/// COUNT non-null: number of rows whose bitmap bit is unset.
pub fn simd_count(nulls: &NullBitmap) -> i64 {
    nulls.non_null_count() as i64
}

/// SUM over non-null rows. NULLs are masked to `0` (the identity for sum)
/// before the kernel runs, per the spec's NULL-handling rule.
pub fn simd_sum(values: &ColumnValues, nulls: &NullBitmap) -> Result<Scalar> {
    require_same_len(values, nulls)?;
    match values {
        ColumnValues::Int64(v) => Ok(Scalar::Int(sum_i64(v, nulls))),
        ColumnValues::Float64(v) => Ok(Scalar::Float(sum_f64(v, nulls))),
        ColumnValues::Text(_) => Err(Error::FormatError(
            "SUM is not defined over a Text column".to_string(),
        )),
    }
}

/// AVG over non-null rows; `0.0` if every row is NULL.
pub fn simd_avg(values: &ColumnValues, nulls: &NullBitmap) -> Result<f64> {
    require_same_len(values, nulls)?;
    let non_null = nulls.non_null_count();
    if non_null == 0 {
        return Ok(0.0);
    }
    let sum = match simd_sum(values, nulls)? {
        Scalar::Int(x) => x as f64,
        Scalar::Float(x) => x,
        Scalar::Text(_) => unreachable!("simd_sum already rejects Text"),
    };
    Ok(sum / non_null as f64)
}

/// MIN over non-null rows; `None` if every row is NULL.
pub fn simd_min(values: &ColumnValues, nulls: &NullBitmap) -> Result<Option<Scalar>> {
    require_same_len(values, nulls)?;
    Ok(extreme(values, nulls, std::cmp::Ordering::Less))
}

/// MAX over non-null rows; `None` if every row is NULL.
pub fn simd_max(values: &ColumnValues, nulls: &NullBitmap) -> Result<Option<Scalar>> {
    require_same_len(values, nulls)?;
    Ok(extreme(values, nulls, std::cmp::Ordering::Greater))
}

/// FILTER: indices of non-null rows satisfying `value OP threshold`, in
/// ascending order.
pub fn simd_filter(values: &ColumnValues, nulls: &NullBitmap, op: RelOp, threshold: &Scalar) -> Result<Vec<usize>> {
    require_same_len(values, nulls)?;
    let mut out = Vec::new();
    for i in 0..values.len() {
        if nulls.is_null(i) {
            continue;
        }
        let candidate = scalar_at(values, i);
        if satisfies(&candidate, op, threshold) {
            out.push(i);
        }
    }
    Ok(out)
}

/// Bitwise AND of two equal-length bitmaps.
pub fn bitmap_and(a: &NullBitmap, b: &NullBitmap) -> Result<Vec<u8>> {
    bitmap_zip(a, b, |x, y| x & y)
}

/// Bitwise OR of two equal-length bitmaps.
pub fn bitmap_or(a: &NullBitmap, b: &NullBitmap) -> Result<Vec<u8>> {
    bitmap_zip(a, b, |x, y| x | y)
}

/// Bitwise NOT of a bitmap. Note the last byte may carry bits past `len`
/// that callers should not interpret as meaningful rows.
pub fn bitmap_not(a: &NullBitmap) -> Vec<u8> {
    a.as_bytes().iter().map(|b| !b).collect()
}

/// POPCOUNT: number of set bits across a bitmap's packed bytes.
pub fn popcount(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| b.count_ones() as u64).sum()
}

fn bitmap_zip(a: &NullBitmap, b: &NullBitmap, op: impl Fn(u8, u8) -> u8) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(Error::FormatError(format!(
            "bitmap length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .map(|(&x, &y)| op(x, y))
        .collect())
}

fn require_same_len(values: &ColumnValues, nulls: &NullBitmap) -> Result<()> {
    if values.len() != nulls.len() {
        return Err(Error::FormatError(format!(
            "column has {} rows but its null bitmap covers {}",
            values.len(),
            nulls.len()
        )));
    }
    Ok(())
}

fn sum_i64(v: &[i64], nulls: &NullBitmap) -> i64 {
    let masked: Vec<i64> = (0..v.len())
        .map(|i| if nulls.is_null(i) { 0 } else { v[i] })
        .collect();
    if masked.len() >= SIMD_SCALAR_FALLBACK_THRESHOLD {
        sum_i64_vectorized(&masked)
    } else {
        masked.iter().sum()
    }
}

fn sum_i64_vectorized(v: &[i64]) -> i64 {
    let mut lanes = [0i64; LANES];
    let chunks = v.chunks_exact(LANES);
    let remainder = chunks.remainder();
    for chunk in chunks {
        for (lane, &x) in lanes.iter_mut().zip(chunk) {
            *lane += x;
        }
    }
    let mut total: i64 = lanes.iter().sum();
    total += remainder.iter().sum::<i64>();
    total
}

fn sum_f64(v: &[f64], nulls: &NullBitmap) -> f64 {
    let masked: Vec<f64> = (0..v.len())
        .map(|i| if nulls.is_null(i) { 0.0 } else { v[i] })
        .collect();
    if masked.len() >= SIMD_SCALAR_FALLBACK_THRESHOLD {
        sum_f64_vectorized(&masked)
    } else {
        masked.iter().sum()
    }
}

fn sum_f64_vectorized(v: &[f64]) -> f64 {
    let mut lanes = [0.0f64; LANES];
    let chunks = v.chunks_exact(LANES);
    let remainder = chunks.remainder();
    for chunk in chunks {
        for (lane, &x) in lanes.iter_mut().zip(chunk) {
            *lane += x;
        }
    }
    let mut total: f64 = lanes.iter().sum();
    total += remainder.iter().sum::<f64>();
    total
}

fn scalar_at(values: &ColumnValues, i: usize) -> Scalar {
    match values {
        ColumnValues::Int64(v) => Scalar::Int(v[i]),
        ColumnValues::Float64(v) => Scalar::Float(v[i]),
        ColumnValues::Text(v) => Scalar::Text(v[i].clone()),
    }
}

fn scalar_ord(a: &Scalar, b: &Scalar) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => x.partial_cmp(y),
        (Scalar::Float(x), Scalar::Float(y)) => x.partial_cmp(y),
        (Scalar::Text(x), Scalar::Text(y)) => x.partial_cmp(y),
        _ => None,
    }
}

fn satisfies(candidate: &Scalar, op: RelOp, threshold: &Scalar) -> bool {
    match scalar_ord(candidate, threshold) {
        Some(ord) => match op {
            RelOp::Eq => ord == std::cmp::Ordering::Equal,
            RelOp::Lt => ord == std::cmp::Ordering::Less,
            RelOp::Le => ord != std::cmp::Ordering::Greater,
            RelOp::Gt => ord == std::cmp::Ordering::Greater,
            RelOp::Ge => ord != std::cmp::Ordering::Less,
        },
        None => false,
    }
}

fn extreme(values: &ColumnValues, nulls: &NullBitmap, want: std::cmp::Ordering) -> Option<Scalar> {
    let mut best: Option<Scalar> = None;
    for i in 0..values.len() {
        if nulls.is_null(i) {
            continue;
        }
        let candidate = scalar_at(values, i);
        best = match &best {
            None => Some(candidate),
            Some(current) => match scalar_ord(&candidate, current) {
                Some(ord) if ord == want => Some(candidate),
                _ => best,
            },
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: Vec<i64>) -> ColumnValues {
        ColumnValues::Int64(v)
    }

    #[test]
    fn count_skips_nulls() {
        let nulls = NullBitmap::from_flags(&[false, true, false, true, false]);
        assert_eq!(simd_count(&nulls), 3);
    }

    #[test]
    fn sum_masks_nulls_to_zero() {
        let values = ints(vec![10, 20, 30, 40]);
        let nulls = NullBitmap::from_flags(&[false, true, false, false]);
        assert_eq!(simd_sum(&values, &nulls).unwrap(), Scalar::Int(80));
    }

    #[test]
    fn sum_matches_between_scalar_and_vectorized_paths() {
        let small: Vec<i64> = (0..50).collect();
        let large: Vec<i64> = (0..5000).collect();
        let small_nulls = NullBitmap::none_null(small.len());
        let large_nulls = NullBitmap::none_null(large.len());
        let small_sum = simd_sum(&ints(small.clone()), &small_nulls).unwrap();
        let large_sum = simd_sum(&ints(large.clone()), &large_nulls).unwrap();
        let expected_small: i64 = small.iter().sum();
        let expected_large: i64 = large.iter().sum();
        assert_eq!(small_sum, Scalar::Int(expected_small));
        assert_eq!(large_sum, Scalar::Int(expected_large));
    }

    #[test]
    fn avg_is_zero_when_all_null() {
        let values = ints(vec![1, 2, 3]);
        let nulls = NullBitmap::from_flags(&[true, true, true]);
        assert_eq!(simd_avg(&values, &nulls).unwrap(), 0.0);
    }

    #[test]
    fn min_max_ignore_nulls() {
        let values = ints(vec![5, 1, 9, 3]);
        let nulls = NullBitmap::from_flags(&[false, false, true, false]);
        assert_eq!(simd_min(&values, &nulls).unwrap(), Some(Scalar::Int(1)));
        assert_eq!(simd_max(&values, &nulls).unwrap(), Some(Scalar::Int(5)));
    }

    #[test]
    fn min_max_is_none_when_all_null() {
        let values = ints(vec![5, 1]);
        let nulls = NullBitmap::from_flags(&[true, true]);
        assert_eq!(simd_min(&values, &nulls).unwrap(), None);
        assert_eq!(simd_max(&values, &nulls).unwrap(), None);
    }

    #[test]
    fn filter_returns_matching_non_null_indices() {
        let values = ints(vec![1, 50, 3, 60, 5]);
        let nulls = NullBitmap::from_flags(&[false, false, false, true, false]);
        let indices = simd_filter(&values, &nulls, RelOp::Gt, &Scalar::Int(10)).unwrap();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn bitmap_ops_agree_with_manual_bytes() {
        let a = NullBitmap::from_flags(&[true, false, true, false]);
        let b = NullBitmap::from_flags(&[true, true, false, false]);
        assert_eq!(bitmap_and(&a, &b).unwrap(), vec![0b0000_0001]);
        assert_eq!(bitmap_or(&a, &b).unwrap(), vec![0b0000_0111]);
    }

    #[test]
    fn popcount_counts_set_bits() {
        assert_eq!(popcount(&[0b1111_0000, 0b0000_0011]), 6);
    }
}
