//! Derived point-in-time metrics.
//!
//! A composite document holds one record (its first `data` slot) whose fields
//! are signed sums of fields taken from the *latest* entry of source snapshots,
//! e.g. `陽性患者数 = 入院 + 退院`. History is not consulted and nothing is
//! gap-filled here.

use std::collections::BTreeMap;

use crate::config::{CompositeConfig, Sign};
use crate::domain::{FieldValue, RawRecord, Snapshot};
use crate::error::PipelineError;

/// Recompute `composite` into the first record of `prior`.
///
/// Fields of `prior`'s first record that no metric writes are preserved. The
/// result's `last_update` is the most recent one among the referenced sources.
pub fn compose(
    prior: &Snapshot,
    sources: &BTreeMap<String, Snapshot>,
    composite: &CompositeConfig,
) -> Result<Snapshot, PipelineError> {
    let mut record = prior.data.first().cloned().unwrap_or_default();
    let mut last_update: Option<&str> = None;

    for metric in &composite.metrics {
        let mut total: i64 = 0;
        for term in &metric.terms {
            let snapshot = sources.get(&term.source).ok_or_else(|| PipelineError::NotFound {
                key: term.source.clone(),
            })?;
            let value = latest_int(&term.source, snapshot, &term.field)?;
            total = match term.sign {
                Sign::Plus => total.saturating_add(value),
                Sign::Minus => total.saturating_sub(value),
            };
            last_update = match last_update {
                Some(current) if current >= snapshot.last_update.as_str() => Some(current),
                _ => Some(snapshot.last_update.as_str()),
            };
        }
        record.insert(metric.field.clone(), FieldValue::Int(total));
    }

    let mut data = prior.data.clone();
    match data.first_mut() {
        Some(first) => *first = record,
        None => data.push(record),
    }

    Ok(Snapshot {
        last_update: last_update.map(str::to_string).unwrap_or_else(|| prior.last_update.clone()),
        data,
    })
}

/// Integer value of `field` in the latest entry of `snapshot`.
pub fn latest_int(source_key: &str, snapshot: &Snapshot, field: &str) -> Result<i64, PipelineError> {
    let missing = || PipelineError::MissingField {
        source_key: source_key.to_string(),
        field: field.to_string(),
    };
    let latest: &RawRecord = snapshot.latest().ok_or_else(missing)?;
    let value = latest.get(field).ok_or_else(missing)?;
    value.as_int().ok_or_else(|| PipelineError::MalformedRecord {
        row: snapshot.data.len() + 1,
        reason: format!("field `{field}` of `{source_key}` is not an integer: '{value}'"),
    })
}
