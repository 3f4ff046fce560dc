//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - persisted series (`DailySeries`, `DailyPoint`)
//! - normalized source data (`Snapshot`, `RawRecord`, `FieldValue`)
//! - aggregation output (`DailyCounts`) and the backfill policy (`GapFillPolicy`)

pub mod types;

pub use types::*;
