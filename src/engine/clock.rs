//! Injectable "current date" so merges are reproducible.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::domain::LAST_UPDATE_FORMAT;
use crate::error::PipelineError;

pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Local calendar day in the clock's time zone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// `last_update` stamp for documents written during this run.
    fn last_update(&self) -> String {
        self.now().format(LAST_UPDATE_FORMAT).to_string()
    }
}

/// Wall clock in a fixed UTC offset (the publishing region's local time).
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn with_offset_hours(hours: i32) -> Result<Self, PipelineError> {
        let offset = FixedOffset::east_opt(hours * 3600)
            .ok_or_else(|| PipelineError::Config(format!("invalid UTC offset: {hours}h")))?;
        Ok(Self { offset })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<FixedOffset>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now }
    }

    /// Pin the clock to `time` on `date` in the given offset.
    pub fn at(date: NaiveDate, time: NaiveTime, offset_hours: i32) -> Result<Self, PipelineError> {
        let offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| PipelineError::Config(format!("invalid UTC offset: {offset_hours}h")))?;
        let now = offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(|| PipelineError::Config(format!("ambiguous local time {date} {time}")))?;
        Ok(Self { now })
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_formats_last_update() {
        let date = NaiveDate::from_ymd_opt(2021, 5, 13).unwrap();
        let clock = FixedClock::at(date, NaiveTime::from_hms_opt(21, 5, 0).unwrap(), 9).unwrap();
        assert_eq!(clock.today(), date);
        assert_eq!(clock.last_update(), "2021/05/13 21:05");
    }

    #[test]
    fn today_follows_the_configured_offset() {
        // 2021-05-12 20:00 UTC is already the 13th in JST.
        let utc = Utc.with_ymd_and_hms(2021, 5, 12, 20, 0, 0).unwrap();
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let clock = FixedClock::new(utc.with_timezone(&jst));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2021, 5, 13).unwrap());
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(SystemClock::with_offset_hours(30).is_err());
    }
}
