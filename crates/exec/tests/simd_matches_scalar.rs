//! Property test for `spec.md` §8 invariant 9: the SIMD kernel result
//! equals a naive scalar reference over random inputs and random NULL
//! masks, across both the scalar-fallback and chunked-vector code paths.

use proptest::prelude::*;
use sharpcore_columnar::{ColumnValues, NullBitmap};
use sharpcore_exec::{simd_avg, simd_count, simd_max, simd_min, simd_sum};

fn scalar_reference_sum(values: &[i64], nulls: &[bool]) -> i64 {
    values.iter().zip(nulls).filter(|(_, &n)| !n).map(|(&v, _)| v).sum()
}

fn scalar_reference_count(nulls: &[bool]) -> i64 {
    nulls.iter().filter(|&&n| !n).count() as i64
}

fn scalar_reference_min(values: &[i64], nulls: &[bool]) -> Option<i64> {
    values.iter().zip(nulls).filter(|(_, &n)| !n).map(|(&v, _)| v).min()
}

fn scalar_reference_max(values: &[i64], nulls: &[bool]) -> Option<i64> {
    values.iter().zip(nulls).filter(|(_, &n)| !n).map(|(&v, _)| v).max()
}

proptest! {
    #[test]
    fn sum_count_min_max_match_scalar_reference(
        values in prop::collection::vec(any::<i64>(), 0..2000),
    ) {
        let nulls_flags: Vec<bool> = (0..values.len()).map(|i| i % 7 == 0).collect();
        let nulls = NullBitmap::from_flags(&nulls_flags);
        let column = ColumnValues::Int64(values.clone());

        let expected_sum = scalar_reference_sum(&values, &nulls_flags);
        let expected_count = scalar_reference_count(&nulls_flags);
        let expected_min = scalar_reference_min(&values, &nulls_flags);
        let expected_max = scalar_reference_max(&values, &nulls_flags);

        prop_assert_eq!(simd_count(&nulls), expected_count);

        if expected_count == 0 {
            prop_assert_eq!(simd_avg(&column, &nulls).unwrap(), 0.0);
            prop_assert!(simd_min(&column, &nulls).unwrap().is_none());
            prop_assert!(simd_max(&column, &nulls).unwrap().is_none());
        } else {
            let sum = simd_sum(&column, &nulls).unwrap();
            prop_assert_eq!(sum, sharpcore_columnar::Scalar::Int(expected_sum));

            let avg = simd_avg(&column, &nulls).unwrap();
            prop_assert!((avg - (expected_sum as f64 / expected_count as f64)).abs() < 1e-6);

            let min = simd_min(&column, &nulls).unwrap();
            prop_assert_eq!(min, expected_min.map(sharpcore_columnar::Scalar::Int));

            let max = simd_max(&column, &nulls).unwrap();
            prop_assert_eq!(max, expected_max.map(sharpcore_columnar::Scalar::Int));
        }
    }
}
