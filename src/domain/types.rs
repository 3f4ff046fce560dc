//! Shared domain types.
//!
//! These mirror the JSON documents the dashboards consume, so field names on
//! the wire follow the published schema (`日付`, `小計`, `last_update`, `data`)
//! while the Rust side uses descriptive names.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Format of every `last_update` string we write.
pub const LAST_UPDATE_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Day format of the leading part of a series timestamp.
pub const SERIES_DAY_FORMAT: &str = "%Y-%m-%d";

/// Fixed time-of-day suffix the dashboards expect on every series timestamp.
pub const SERIES_TIME_SUFFIX: &str = "T08:00:00.000Z";

/// Render a calendar day as the canonical series timestamp.
pub fn format_series_timestamp(date: NaiveDate) -> String {
    format!("{}{SERIES_TIME_SUFFIX}", date.format(SERIES_DAY_FORMAT))
}

/// Parse the day out of a canonical series timestamp.
///
/// Only the first 10 characters are interpreted; the time suffix is ignored.
pub fn parse_series_timestamp(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, SERIES_DAY_FORMAT).ok()
}

/// One day of a persisted series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoint {
    #[serde(
        rename = "日付",
        serialize_with = "serialize_day",
        deserialize_with = "deserialize_day"
    )]
    pub date: NaiveDate,
    #[serde(rename = "小計")]
    pub value: u64,
}

impl DailyPoint {
    pub fn new(date: NaiveDate, value: u64) -> Self {
        Self { date, value }
    }
}

fn serialize_day<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_series_timestamp(*date))
}

fn deserialize_day<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_series_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid series date '{raw}'")))
}

/// The persisted, gap-free daily history of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySeries {
    pub last_update: String,
    #[serde(rename = "data")]
    pub points: Vec<DailyPoint>,
}

impl DailySeries {
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    /// Sum of all point values.
    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.value).sum()
    }

    /// Days missing between consecutive points (empty for a well-formed series).
    pub fn gaps(&self) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        for pair in self.points.windows(2) {
            let mut day = pair[0].date;
            while let Some(next) = day.succ_opt() {
                if next >= pair[1].date {
                    break;
                }
                out.push(next);
                day = next;
            }
        }
        out
    }

    /// True when dates are strictly increasing (no duplicates, no reordering).
    pub fn is_strictly_increasing(&self) -> bool {
        self.points.windows(2).all(|w| w[0].date < w[1].date)
    }
}

/// A normalized field value: integer-cast fields become `Int`, everything else `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One source row keyed by canonical field name.
pub type RawRecord = BTreeMap<String, FieldValue>;

/// One normalized fetch of a source dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_update: String,
    pub data: Vec<RawRecord>,
}

impl Snapshot {
    pub fn latest(&self) -> Option<&RawRecord> {
        self.data.last()
    }
}

/// Occurrences per calendar day. Days absent from the source window have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyCounts(BTreeMap<NaiveDate, u64>);

impl DailyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, date: NaiveDate) {
        *self.0.entry(date).or_insert(0) += 1;
    }

    pub fn get(&self, date: NaiveDate) -> Option<u64> {
        self.0.get(&date).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }

    /// Observed days as points, ascending by date.
    pub fn to_points(&self) -> Vec<DailyPoint> {
        self.iter().map(|(d, v)| DailyPoint::new(d, v)).collect()
    }
}

impl FromIterator<(NaiveDate, u64)> for DailyCounts {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How a merge fills calendar days the source window did not cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFillPolicy {
    /// Unobserved days had zero new occurrences.
    ZeroFill,
    /// Unobserved days repeat the most recent published figure.
    CarryForward,
}
