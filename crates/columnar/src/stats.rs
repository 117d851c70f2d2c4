//! Column statistics (`spec.md` §4.9 and §4.11's cardinality estimation).

use crate::value::{ColumnValues, NullBitmap};
use sharpcore_core::limits::{DEFAULT_SELECTIVITY_ESTIMATE, HISTOGRAM_BUCKETS};
use sharpcore_core::{Error, Result};

/// A comparable scalar, used for `min`/`max`/histogram bounds and for
/// `column_stats`-derived selectivity estimates, independent of which
/// [`crate::value::ColumnType`] produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Int64 bound.
    Int(i64),
    /// Float64 bound.
    Float(f64),
    /// Text bound, compared lexicographically.
    Text(String),
}

impl Scalar {
    fn partial_cmp(&self, other: &Scalar) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => a.partial_cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.partial_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// The relational operator a predicate applies, used by [`ColumnStats::selectivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// A 10-bucket equi-count histogram over sorted non-NULL values.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Upper bound (inclusive) of each bucket, in ascending order.
    pub bucket_bounds: Vec<Scalar>,
    /// Fraction of non-NULL rows falling in each bucket (sums to ~1.0).
    pub bucket_fractions: Vec<f64>,
}

impl Histogram {
    /// Build an equi-count histogram from sorted non-NULL scalars.
    fn build(mut sorted: Vec<Scalar>) -> Option<Histogram> {
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let bucket_count = HISTOGRAM_BUCKETS.min(n);
        let mut bucket_bounds = Vec::with_capacity(bucket_count);
        let mut bucket_fractions = Vec::with_capacity(bucket_count);

        let mut start = 0;
        for b in 0..bucket_count {
            let end = ((b + 1) * n) / bucket_count;
            let end = end.max(start + 1).min(n);
            bucket_bounds.push(sorted[end - 1].clone());
            bucket_fractions.push((end - start) as f64 / n as f64);
            start = end;
        }

        Some(Histogram {
            bucket_bounds,
            bucket_fractions,
        })
    }
}

/// Per-column statistics captured at encode time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    /// Minimum non-NULL value, if any rows are non-NULL.
    pub min: Option<Scalar>,
    /// Maximum non-NULL value, if any rows are non-NULL.
    pub max: Option<Scalar>,
    /// Number of NULL rows.
    pub null_count: u64,
    /// Number of distinct non-NULL values.
    pub distinct_count: u64,
    /// Optional equi-count histogram over sorted non-NULL values.
    pub histogram: Option<Histogram>,
    pub(crate) value_count: u64,
}

impl ColumnStats {
    /// Rebuild a `ColumnStats` from its decoded on-disk parts, used by
    /// [`crate::segment::column_stats`] when a caller asks for statistics
    /// without decoding a column's values.
    pub(crate) fn from_parts(
        min: Option<Scalar>,
        max: Option<Scalar>,
        null_count: u64,
        distinct_count: u64,
        histogram: Option<Histogram>,
    ) -> Self {
        ColumnStats {
            min,
            max,
            null_count,
            distinct_count,
            histogram,
            value_count: 0,
        }
    }

    /// Compute statistics for a column, building a histogram when the
    /// column is large enough to make one meaningful.
    pub fn compute(values: &ColumnValues, nulls: &NullBitmap) -> Result<Self> {
        if values.len() != nulls.len() {
            return Err(Error::FormatError(format!(
                "column has {} rows but its null bitmap covers {}",
                values.len(),
                nulls.len()
            )));
        }

        let scalars = non_null_scalars(values, nulls);
        let distinct_count = {
            let mut seen: Vec<&Scalar> = Vec::with_capacity(scalars.len());
            for s in &scalars {
                if !seen.iter().any(|existing| scalars_eq(existing, s)) {
                    seen.push(s);
                }
            }
            seen.len() as u64
        };

        let min = scalars
            .iter()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned();
        let max = scalars
            .iter()
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned();

        let histogram = Histogram::build(scalars);

        let stats = ColumnStats {
            min,
            max,
            null_count: nulls.null_count() as u64,
            distinct_count,
            histogram,
            value_count: values.len() as u64,
        };
        stats.validate()?;
        Ok(stats)
    }

    /// Checks the spec's stats invariant: `distinct <= value_count - null_count`.
    pub fn validate(&self) -> Result<()> {
        let non_null = self.value_count.saturating_sub(self.null_count);
        if self.distinct_count > non_null {
            return Err(Error::FormatError(format!(
                "distinct_count {} exceeds non-null row count {}",
                self.distinct_count, non_null
            )));
        }
        Ok(())
    }

    /// Estimate the fraction of non-NULL rows satisfying `col OP literal`,
    /// consumed directly by the optimizer's cardinality estimation
    /// (`spec.md` §4.11) so it never re-implements bucket walking.
    pub fn selectivity(&self, op: RelOp, literal: &Scalar) -> f64 {
        let Some(histogram) = &self.histogram else {
            return DEFAULT_SELECTIVITY_ESTIMATE;
        };
        if histogram.bucket_bounds.is_empty() {
            return DEFAULT_SELECTIVITY_ESTIMATE;
        }

        let mut fraction = 0.0;
        for (bound, bucket_fraction) in histogram
            .bucket_bounds
            .iter()
            .zip(histogram.bucket_fractions.iter())
        {
            let satisfies = match bound.partial_cmp(literal) {
                Some(ord) => match op {
                    RelOp::Eq => ord == std::cmp::Ordering::Equal,
                    RelOp::Lt => ord == std::cmp::Ordering::Less,
                    RelOp::Le => ord != std::cmp::Ordering::Greater,
                    RelOp::Gt => ord == std::cmp::Ordering::Greater,
                    RelOp::Ge => ord != std::cmp::Ordering::Less,
                },
                None => false,
            };
            if satisfies {
                fraction += bucket_fraction;
            }
        }
        fraction.clamp(0.0, 1.0)
    }

    /// Equality selectivity shortcut for dictionary-encoded columns:
    /// `1 / distinct_count`, per `spec.md` §4.11.
    pub fn dictionary_equality_selectivity(&self) -> f64 {
        if self.distinct_count == 0 {
            0.0
        } else {
            1.0 / self.distinct_count as f64
        }
    }
}

fn scalars_eq(a: &Scalar, b: &Scalar) -> bool {
    matches!(a.partial_cmp(b), Some(std::cmp::Ordering::Equal))
}

fn non_null_scalars(values: &ColumnValues, nulls: &NullBitmap) -> Vec<Scalar> {
    let mut out = Vec::with_capacity(values.len());
    match values {
        ColumnValues::Int64(v) => {
            for (i, value) in v.iter().enumerate() {
                if !nulls.is_null(i) {
                    out.push(Scalar::Int(*value));
                }
            }
        }
        ColumnValues::Float64(v) => {
            for (i, value) in v.iter().enumerate() {
                if !nulls.is_null(i) {
                    out.push(Scalar::Float(*value));
                }
            }
        }
        ColumnValues::Text(v) => {
            for (i, value) in v.iter().enumerate() {
                if !nulls.is_null(i) {
                    out.push(Scalar::Text(value.clone()));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_report_min_max_and_distinct() {
        let values = ColumnValues::Int64(vec![3, 1, 4, 1, 5, 9, 2, 6]);
        let nulls = NullBitmap::none_null(8);
        let stats = ColumnStats::compute(&values, &nulls).unwrap();
        assert_eq!(stats.min, Some(Scalar::Int(1)));
        assert_eq!(stats.max, Some(Scalar::Int(9)));
        assert_eq!(stats.distinct_count, 7);
        assert_eq!(stats.null_count, 0);
    }

    #[test]
    fn nulls_are_excluded_from_distinct_and_bounds() {
        let values = ColumnValues::Int64(vec![10, 0, 20, 0]);
        let nulls = NullBitmap::from_flags(&[false, true, false, true]);
        let stats = ColumnStats::compute(&values, &nulls).unwrap();
        assert_eq!(stats.null_count, 2);
        assert_eq!(stats.distinct_count, 2);
        assert_eq!(stats.min, Some(Scalar::Int(10)));
        assert_eq!(stats.max, Some(Scalar::Int(20)));
    }

    #[test]
    fn selectivity_falls_back_to_default_without_a_histogram() {
        let values = ColumnValues::Int64(vec![]);
        let nulls = NullBitmap::none_null(0);
        let stats = ColumnStats::compute(&values, &nulls).unwrap();
        assert_eq!(stats.selectivity(RelOp::Eq, &Scalar::Int(5)), 0.1);
    }

    #[test]
    fn selectivity_of_full_range_predicate_is_close_to_one() {
        let values = ColumnValues::Int64((0..100).collect());
        let nulls = NullBitmap::none_null(100);
        let stats = ColumnStats::compute(&values, &nulls).unwrap();
        let fraction = stats.selectivity(RelOp::Ge, &Scalar::Int(0));
        assert!(fraction > 0.9, "expected near-total coverage, got {fraction}");
    }
}
