//! Daily aggregation: count records per event date.

use chrono::NaiveDate;

use crate::domain::{DailyCounts, FieldValue, RawRecord};
use crate::error::PipelineError;

/// Parse a source date cell in `format`.
pub fn parse_source_date(field: &str, value: &FieldValue, format: &str) -> Result<NaiveDate, PipelineError> {
    let raw = value.to_string();
    NaiveDate::parse_from_str(raw.trim(), format).map_err(|_| PipelineError::DateParse {
        field: field.to_string(),
        value: raw,
        format: format.to_string(),
    })
}

/// Count records per day of `date_field`.
///
/// Every record must carry a parseable date; one bad date fails the whole
/// aggregation rather than silently dropping rows. A record without the field
/// is reported as a date parse failure on an empty value.
pub fn daily_counts(records: &[RawRecord], date_field: &str, format: &str) -> Result<DailyCounts, PipelineError> {
    let mut counts = DailyCounts::new();
    for record in records {
        let date = match record.get(date_field) {
            Some(value) => parse_source_date(date_field, value, format)?,
            None => {
                return Err(PipelineError::DateParse {
                    field: date_field.to_string(),
                    value: String::new(),
                    format: format.to_string(),
                });
            }
        };
        counts.increment(date);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str) -> RawRecord {
        RawRecord::from([
            ("公表日".to_string(), FieldValue::Text(date.to_string())),
            ("年代".to_string(), FieldValue::Text("30代".to_string())),
        ])
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn counts_occurrences_per_day() {
        let records = vec![record("2021/05/11"), record("2021/05/11"), record("2021/05/13")];
        let counts = daily_counts(&records, "公表日", "%Y/%m/%d").unwrap();
        assert_eq!(counts.get(day(2021, 5, 11)), Some(2));
        assert_eq!(counts.get(day(2021, 5, 13)), Some(1));
        // Absence is not zero.
        assert_eq!(counts.get(day(2021, 5, 12)), None);
        assert_eq!(counts.iter().count(), 2);
    }

    #[test]
    fn input_is_not_mutated() {
        let records = vec![record("2021/05/11")];
        let before = records.clone();
        daily_counts(&records, "公表日", "%Y/%m/%d").unwrap();
        assert_eq!(records, before);
    }

    #[test]
    fn bad_date_is_fatal() {
        let records = vec![record("2021/05/11"), record("5月12日")];
        let err = daily_counts(&records, "公表日", "%Y/%m/%d").unwrap_err();
        assert!(matches!(err, PipelineError::DateParse { value, .. } if value == "5月12日"));
    }

    #[test]
    fn missing_date_field_is_fatal() {
        let records = vec![RawRecord::new()];
        assert!(daily_counts(&records, "公表日", "%Y/%m/%d").is_err());
    }
}
