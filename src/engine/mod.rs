//! Transformation core: aggregation, merge/backfill, reshaping and derived metrics.
//!
//! Everything here is pure computation over in-memory values; fetching and
//! persistence live in `data` and `io`.

pub mod aggregate;
pub mod clock;
pub mod compose;
pub mod merge;
pub mod regions;
pub mod reshape;

pub use aggregate::{daily_counts, parse_source_date};
pub use clock::{Clock, FixedClock, SystemClock};
pub use compose::compose;
pub use merge::{MergeOutcome, append_with_backfill, extend_with_carry_forward, merge};
pub use regions::{RegionCount, RegionCounts, region_counts};
pub use reshape::{reshape_details, to_daily_points};
