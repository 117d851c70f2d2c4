//! SIMD execution kernels and the cost-based optimizer (`spec.md` §4.10,
//! §4.11, components C10/C11).
//!
//! Operates purely on in-memory [`sharpcore_columnar`] buffers — no
//! knowledge of the block store or file layout.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod decode;
mod kernels;
mod optimizer;

pub use decode::decode_for_kernels;
pub use kernels::{
    bitmap_and, bitmap_not, bitmap_or, popcount, simd_avg, simd_count, simd_filter, simd_max, simd_min, simd_sum,
};
pub use optimizer::{plan_query, CostModel, Plan, PlanCache, PlanKind, Predicate, QuerySpec};
