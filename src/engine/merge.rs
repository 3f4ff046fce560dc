//! Series merge and backfill.
//!
//! A merge reconciles a persisted `DailySeries` with the points observed in the
//! latest source window and fills every calendar day between the persisted tail
//! (`last_day`) and `today` according to a `GapFillPolicy`:
//!
//! - `ZeroFill`: days after `last_day` up to and including `today` are appended;
//!   a day the window does not cover gets `0`. When `today == last_day` the
//!   tail value is overwritten by the window's figure for today, if any
//!   (same-day revision).
//! - `CarryForward`: window rows dated after `last_day` are appended as
//!   observed; days strictly between `last_day` and `today` that the window
//!   does not cover repeat the value of the entry preceding them. Portals for
//!   these feeds skip weekends and holidays instead of publishing zero rows,
//!   so "unchanged since the last published figure" is the working
//!   approximation. When `today - last_day == 1` nothing is synthesized.
//!
//! The merge is pure: no I/O, the caller supplies `today`. A series is never
//! truncated or reordered, and the result has no gaps from `last_day` onward.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::domain::{DailyCounts, DailyPoint, DailySeries, GapFillPolicy};
use crate::error::PipelineError;

/// Result of one merge plus what it did, for logging and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub series: DailySeries,
    /// Days appended with an observed value.
    pub observed: Vec<NaiveDate>,
    /// Days appended with a policy-defined value.
    pub synthesized: Vec<NaiveDate>,
    /// The tail point was overwritten by a same-day figure.
    pub revised: bool,
    /// Window rows ignored because the series already covers their day.
    pub stale_rows: usize,
}

impl MergeOutcome {
    fn unchanged(series: DailySeries) -> Self {
        Self {
            series,
            observed: Vec::new(),
            synthesized: Vec::new(),
            revised: false,
            stale_rows: 0,
        }
    }

    pub fn appended(&self) -> usize {
        self.observed.len() + self.synthesized.len()
    }
}

/// Merge `window` into `prior` using `policy`.
///
/// `key` only labels errors. `window` need not be sorted.
pub fn merge(
    key: &str,
    prior: &DailySeries,
    window: &[DailyPoint],
    today: NaiveDate,
    policy: GapFillPolicy,
) -> Result<MergeOutcome, PipelineError> {
    let outcome = match policy {
        GapFillPolicy::ZeroFill => {
            let counts: DailyCounts = window.iter().map(|p| (p.date, p.value)).collect();
            append_with_backfill(key, prior, &counts, today)?
        }
        GapFillPolicy::CarryForward => extend_with_carry_forward(key, prior, window, today)?,
    };
    debug!(
        key,
        ?policy,
        observed = outcome.observed.len(),
        synthesized = outcome.synthesized.len(),
        revised = outcome.revised,
        stale_rows = outcome.stale_rows,
        "merged"
    );
    Ok(outcome)
}

/// Zero-fill merge of aggregated counts.
pub fn append_with_backfill(
    key: &str,
    prior: &DailySeries,
    counts: &DailyCounts,
    today: NaiveDate,
) -> Result<MergeOutcome, PipelineError> {
    let (last_day, period) = backfill_period(key, prior, today)?;
    let mut outcome = MergeOutcome::unchanged(prior.clone());

    if period == 0 {
        if let (Some(value), Some(tail)) = (counts.get(today), outcome.series.points.last_mut()) {
            outcome.revised = tail.value != value;
            tail.value = value;
        }
        return Ok(outcome);
    }

    for d in 1..=period {
        let day = last_day + Duration::days(d);
        match counts.get(day) {
            Some(value) => {
                outcome.series.points.push(DailyPoint::new(day, value));
                outcome.observed.push(day);
            }
            None => {
                outcome.series.points.push(DailyPoint::new(day, 0));
                outcome.synthesized.push(day);
            }
        }
    }
    Ok(outcome)
}

/// Carry-forward merge of per-day rows published by the source.
pub fn extend_with_carry_forward(
    key: &str,
    prior: &DailySeries,
    window: &[DailyPoint],
    today: NaiveDate,
) -> Result<MergeOutcome, PipelineError> {
    let (last_day, period) = backfill_period(key, prior, today)?;
    let mut outcome = MergeOutcome::unchanged(prior.clone());

    // Rows on or before last_day are already persisted; a later row for the
    // same day replaces an earlier one.
    let mut fresh: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for point in window {
        if point.date <= last_day {
            outcome.stale_rows += 1;
            continue;
        }
        if point.date > today {
            return Err(PipelineError::ClockSkew {
                day: point.date,
                today,
            });
        }
        fresh.insert(point.date, point.value);
    }

    if period == 1 {
        // Only today can be missing and the window is trusted to cover it.
        for (day, value) in fresh {
            outcome.series.points.push(DailyPoint::new(day, value));
            outcome.observed.push(day);
        }
        return Ok(outcome);
    }

    let mut carried = outcome.series.points.last().map(|p| p.value).unwrap_or(0);
    for d in 1..=period {
        let day = last_day + Duration::days(d);
        if let Some(&value) = fresh.get(&day) {
            outcome.series.points.push(DailyPoint::new(day, value));
            outcome.observed.push(day);
            carried = value;
        } else if d < period {
            outcome.series.points.push(DailyPoint::new(day, carried));
            outcome.synthesized.push(day);
        }
    }
    Ok(outcome)
}

/// `last_day` of `prior` and the whole days from it to `today`.
fn backfill_period(key: &str, prior: &DailySeries, today: NaiveDate) -> Result<(NaiveDate, i64), PipelineError> {
    let last_day = prior.last_day().ok_or_else(|| PipelineError::CorruptSeries {
        key: key.to_string(),
        reason: "series has no points, cannot establish its last day".to_string(),
    })?;
    let period = (today - last_day).num_days();
    if period < 0 {
        return Err(PipelineError::ClockSkew { day: last_day, today });
    }
    Ok((last_day, period))
}
