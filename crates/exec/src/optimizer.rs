//! Cost-based query optimizer (`spec.md` §4.11, component C11).
//!
//! SQL parsing is out of scope for this core (`spec.md` §9, open question
//! 2): a [`QuerySpec`] is the caller's pre-parsed description of what to
//! scan, and the plan cache is keyed by a caller-supplied fingerprint
//! rather than by SQL text. Mapping SQL text to that fingerprint is the
//! caller's responsibility.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sharpcore_columnar::{ColumnStats, RelOp, Scalar};
use sharpcore_core::limits::{
    DEFAULT_COST_ALPHA, DEFAULT_COST_BETA, DEFAULT_COST_GAMMA, DEFAULT_PLAN_CACHE_CAPACITY,
    DEFAULT_SELECTIVITY_ESTIMATE, PUSHDOWN_SELECTIVITY_THRESHOLD,
};
use std::collections::VecDeque;
use tracing::debug;

/// A single `column OP literal` predicate in a [`QuerySpec`].
#[derive(Debug, Clone)]
pub struct Predicate {
    /// Column this predicate filters on.
    pub column: String,
    /// Relational operator.
    pub op: RelOp,
    /// Right-hand side literal.
    pub literal: Scalar,
}

/// A caller-supplied description of a scan, parsed SQL or otherwise.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Table name, opaque to this core.
    pub table: String,
    /// Columns to project.
    pub projection: Vec<String>,
    /// Predicates to apply.
    pub predicates: Vec<Predicate>,
    /// Caller's estimate of the table's row count.
    pub row_count_estimate: u64,
}

/// The kind of scan a [`Plan`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Row-by-row scan with predicates evaluated per row.
    TableScan,
    /// Reserved: this core has no index structure, so no plan ever selects
    /// this; it exists only because `spec.md` §4.11 names it.
    IndexScan,
    /// Predicates are pushed into §4.10 FILTER kernels over columnar
    /// segments.
    SimdScan,
}

/// A chosen plan for a [`QuerySpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The scan strategy chosen.
    pub kind: PlanKind,
    /// Indices into the originating `QuerySpec::predicates`, most
    /// selective (fewest matching rows) first.
    pub predicate_order: Vec<usize>,
    /// The cost model's estimate for this plan.
    pub estimated_cost: f64,
}

/// Configurable weights for the cost model `cost = α·rows_scanned +
/// β·rows_emitted + γ·cpu_per_predicate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Weight per row scanned.
    pub alpha: f64,
    /// Weight per row emitted.
    pub beta: f64,
    /// Weight per predicate evaluated, per row scanned.
    pub gamma: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            alpha: DEFAULT_COST_ALPHA,
            beta: DEFAULT_COST_BETA,
            gamma: DEFAULT_COST_GAMMA,
        }
    }
}

/// Estimate the selectivity of one predicate against a column's
/// statistics, per `spec.md` §4.11: `1/distinct-count` for an equality
/// predicate, a histogram bucket walk otherwise, and the spec's default
/// when no statistics are available.
fn predicate_selectivity(predicate: &Predicate, stats: Option<&ColumnStats>) -> f64 {
    let Some(stats) = stats else {
        return DEFAULT_SELECTIVITY_ESTIMATE;
    };
    if predicate.op == RelOp::Eq && stats.distinct_count > 0 {
        stats.dictionary_equality_selectivity()
    } else {
        stats.selectivity(predicate.op, &predicate.literal)
    }
}

/// Plan a [`QuerySpec`], looking up each predicate's column statistics via
/// `stats_for` (returns `None` when no statistics are known for a column,
/// falling back to the spec's default selectivity).
pub fn plan_query(
    spec: &QuerySpec,
    stats_for: impl Fn(&str) -> Option<ColumnStats>,
    cost_model: &CostModel,
) -> Plan {
    let mut selectivities: Vec<(usize, f64)> = spec
        .predicates
        .iter()
        .enumerate()
        .map(|(i, p)| (i, predicate_selectivity(p, stats_for(&p.column).as_ref())))
        .collect();
    selectivities.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let predicate_order: Vec<usize> = selectivities.iter().map(|(i, _)| *i).collect();
    let combined_selectivity = selectivities.iter().fold(1.0_f64, |acc, (_, sel)| acc * sel);
    let min_selectivity = selectivities
        .iter()
        .map(|(_, sel)| *sel)
        .fold(1.0_f64, f64::min);

    let rows_scanned = spec.row_count_estimate as f64;
    let rows_emitted = rows_scanned * combined_selectivity;
    let cpu_per_predicate = spec.predicates.len() as f64 * rows_scanned;
    let estimated_cost =
        cost_model.alpha * rows_scanned + cost_model.beta * rows_emitted + cost_model.gamma * cpu_per_predicate;

    let kind = if !spec.predicates.is_empty() && min_selectivity < PUSHDOWN_SELECTIVITY_THRESHOLD {
        PlanKind::SimdScan
    } else {
        PlanKind::TableScan
    };

    debug!(
        ?kind,
        min_selectivity,
        estimated_cost,
        predicates = spec.predicates.len(),
        "planned query"
    );

    Plan {
        kind,
        predicate_order,
        estimated_cost,
    }
}

/// A bounded, fingerprint-keyed plan cache. Eviction is FIFO by insertion
/// order: the spec only requires plans be cacheable by fingerprint, not
/// any particular recency policy.
pub struct PlanCache {
    capacity: usize,
    entries: Mutex<(FxHashMap<u64, Plan>, VecDeque<u64>)>,
}

impl PlanCache {
    /// Build a cache holding up to `capacity` plans.
    pub fn new(capacity: usize) -> Self {
        PlanCache {
            capacity,
            entries: Mutex::new((FxHashMap::default(), VecDeque::new())),
        }
    }

    /// Look up a previously cached plan by fingerprint.
    pub fn get(&self, fingerprint: u64) -> Option<Plan> {
        self.entries.lock().0.get(&fingerprint).cloned()
    }

    /// Cache `plan` under `fingerprint`, evicting the oldest entry if full.
    pub fn insert(&self, fingerprint: u64, plan: Plan) {
        let mut guard = self.entries.lock();
        if !guard.0.contains_key(&fingerprint) {
            if guard.1.len() >= self.capacity {
                if let Some(oldest) = guard.1.pop_front() {
                    guard.0.remove(&oldest);
                }
            }
            guard.1.push_back(fingerprint);
        }
        guard.0.insert(fingerprint, plan);
    }

    /// Number of plans currently cached.
    pub fn len(&self) -> usize {
        self.entries.lock().0.len()
    }

    /// Whether the cache currently holds no plans.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().0.is_empty()
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        PlanCache::new(DEFAULT_PLAN_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpcore_columnar::{ColumnValues, NullBitmap};

    fn stats_for_sorted_column() -> ColumnStats {
        let values = ColumnValues::Int64((0..1000).collect());
        let nulls = NullBitmap::none_null(1000);
        ColumnStats::compute(&values, &nulls).unwrap()
    }

    #[test]
    fn plan_without_predicates_is_a_table_scan() {
        let spec = QuerySpec {
            table: "t".to_string(),
            projection: vec!["a".to_string()],
            predicates: vec![],
            row_count_estimate: 1000,
        };
        let plan = plan_query(&spec, |_| None, &CostModel::default());
        assert_eq!(plan.kind, PlanKind::TableScan);
        assert!(plan.predicate_order.is_empty());
    }

    #[test]
    fn selective_predicate_triggers_simd_scan_pushdown() {
        let stats = stats_for_sorted_column();
        let spec = QuerySpec {
            table: "t".to_string(),
            projection: vec!["age".to_string()],
            predicates: vec![Predicate {
                column: "age".to_string(),
                op: RelOp::Lt,
                literal: Scalar::Int(10),
            }],
            row_count_estimate: 1000,
        };
        let plan = plan_query(&spec, |_| Some(stats.clone()), &CostModel::default());
        assert_eq!(plan.kind, PlanKind::SimdScan);
        assert_eq!(plan.predicate_order, vec![0]);
    }

    #[test]
    fn most_selective_predicate_is_ordered_first() {
        let stats = stats_for_sorted_column();
        let spec = QuerySpec {
            table: "t".to_string(),
            projection: vec!["age".to_string()],
            predicates: vec![
                Predicate {
                    column: "age".to_string(),
                    op: RelOp::Ge,
                    literal: Scalar::Int(0),
                },
                Predicate {
                    column: "age".to_string(),
                    op: RelOp::Lt,
                    literal: Scalar::Int(5),
                },
            ],
            row_count_estimate: 1000,
        };
        let plan = plan_query(&spec, |_| Some(stats.clone()), &CostModel::default());
        assert_eq!(plan.predicate_order.first(), Some(&1));
    }

    #[test]
    fn plan_cache_evicts_oldest_entry_past_capacity() {
        let cache = PlanCache::new(2);
        let plan = Plan {
            kind: PlanKind::TableScan,
            predicate_order: vec![],
            estimated_cost: 1.0,
        };
        cache.insert(1, plan.clone());
        cache.insert(2, plan.clone());
        cache.insert(3, plan.clone());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(1).is_none());
        assert!(cache.get(3).is_some());
    }
}
