//! Pure record reshaping.
//!
//! Source snapshots feed several outputs, so nothing here edits a record in
//! place; every function builds new records.

use crate::config::DetailConfig;
use crate::domain::{DailyPoint, FieldValue, RawRecord, Snapshot, format_series_timestamp};
use crate::engine::aggregate::parse_source_date;
use crate::error::PipelineError;

/// Map each record to a `DailyPoint` read from `date_field` and `value_field`.
///
/// Values must be non-negative integers (configure `value_field` as an integer field).
pub fn to_daily_points(
    source_key: &str,
    records: &[RawRecord],
    date_field: &str,
    value_field: &str,
    date_format: &str,
) -> Result<Vec<DailyPoint>, PipelineError> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let date = parse_source_date(date_field, require(source_key, record, date_field)?, date_format)?;
            let raw = require(source_key, record, value_field)?;
            let value = raw
                .as_int()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| PipelineError::MalformedRecord {
                    row: idx + 2,
                    reason: format!("field `{value_field}` must be a non-negative integer, got '{raw}'"),
                })?;
            Ok(DailyPoint::new(date, value))
        })
        .collect()
}

/// Rename, reformat and drop fields according to `detail`.
///
/// Order: renames first, then date reformatting (date fields are named after
/// renaming), then drops. A missing rename source or date field is an error;
/// dropping an absent field is not.
pub fn reshape_details(
    source_key: &str,
    snapshot: &Snapshot,
    detail: &DetailConfig,
    date_format: &str,
) -> Result<Snapshot, PipelineError> {
    let data = snapshot
        .data
        .iter()
        .map(|record| reshape_record(source_key, record, detail, date_format))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Snapshot {
        last_update: snapshot.last_update.clone(),
        data,
    })
}

fn reshape_record(
    source_key: &str,
    record: &RawRecord,
    detail: &DetailConfig,
    date_format: &str,
) -> Result<RawRecord, PipelineError> {
    let mut out = record.clone();

    for (from, to) in &detail.rename {
        let value = out.remove(from).ok_or_else(|| PipelineError::MissingField {
            source_key: source_key.to_string(),
            field: from.clone(),
        })?;
        out.insert(to.clone(), value);
    }

    for field in &detail.date_fields {
        let date = parse_source_date(field, require(source_key, &out, field)?, date_format)?;
        out.insert(field.clone(), FieldValue::Text(format_series_timestamp(date)));
    }

    for field in &detail.drop {
        out.remove(field);
    }
    Ok(out)
}

fn require<'a>(source_key: &str, record: &'a RawRecord, field: &str) -> Result<&'a FieldValue, PipelineError> {
    record.get(field).ok_or_else(|| PipelineError::MissingField {
        source_key: source_key.to_string(),
        field: field.to_string(),
    })
}
