//! Property tests for merge invariants.
//!
//! For any persisted series ending on `last_day`, any observed window and any
//! `today >= last_day`, a successful merge yields a series whose consecutive
//! points are exactly one day apart, whose prefix is untouched, and whose
//! synthesized values follow the selected policy.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use epi_series::domain::{DailyPoint, DailySeries, GapFillPolicy};
use epi_series::engine::merge;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 5, 1).unwrap()
}

/// A gap-free prior series of 1..10 points starting at `base()`.
fn arb_prior() -> impl Strategy<Value = DailySeries> {
    prop::collection::vec(0u64..500, 1..10).prop_map(|values| DailySeries {
        last_update: "2021/05/01 10:00".to_string(),
        points: values
            .into_iter()
            .enumerate()
            .map(|(i, v)| DailyPoint::new(base() + Duration::days(i as i64), v))
            .collect(),
    })
}

/// Prior series, days from its tail to today, and window rows as (offset, value).
fn arb_case() -> impl Strategy<Value = (DailySeries, i64, Vec<(i64, u64)>)> {
    (arb_prior(), 0i64..15).prop_flat_map(|(prior, period)| {
        let len = prior.points.len() as i64;
        let window = prop::collection::vec((-(len - 1)..=period, 0u64..500), 0..12);
        (Just(prior), Just(period), window)
    })
}

fn window_points(prior: &DailySeries, rows: &[(i64, u64)]) -> Vec<DailyPoint> {
    let last_day = prior.last_day().unwrap();
    rows.iter()
        .map(|&(offset, v)| DailyPoint::new(last_day + Duration::days(offset), v))
        .collect()
}

proptest! {
    #[test]
    fn merged_series_has_no_gaps((prior, period, rows) in arb_case(), carry in any::<bool>()) {
        let policy = if carry { GapFillPolicy::CarryForward } else { GapFillPolicy::ZeroFill };
        let today = prior.last_day().unwrap() + Duration::days(period);
        let window = window_points(&prior, &rows);

        let out = merge("prop", &prior, &window, today, policy).unwrap();

        for pair in out.series.points.windows(2) {
            prop_assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
        }
        // Never truncated; history before the tail is never rewritten.
        prop_assert!(out.series.points.len() >= prior.points.len());
        let keep = prior.points.len() - 1;
        prop_assert_eq!(&out.series.points[..keep], &prior.points[..keep]);
        prop_assert!(out.series.last_day().unwrap() <= today);
    }

    #[test]
    fn zero_fill_synthesizes_zeros((prior, period, rows) in arb_case()) {
        let today = prior.last_day().unwrap() + Duration::days(period);
        let window = window_points(&prior, &rows);

        let out = merge("prop", &prior, &window, today, GapFillPolicy::ZeroFill).unwrap();

        prop_assert_eq!(out.series.last_day(), Some(today));
        for day in &out.synthesized {
            let point = out.series.points.iter().find(|p| p.date == *day).unwrap();
            prop_assert_eq!(point.value, 0);
            prop_assert!(window.iter().all(|w| w.date != *day));
        }
    }

    #[test]
    fn carry_forward_repeats_preceding_value((prior, period, rows) in arb_case()) {
        let today = prior.last_day().unwrap() + Duration::days(period);
        let window = window_points(&prior, &rows);

        let out = merge("prop", &prior, &window, today, GapFillPolicy::CarryForward).unwrap();

        for day in &out.synthesized {
            let idx = out.series.points.iter().position(|p| p.date == *day).unwrap();
            prop_assert!(idx > 0);
            prop_assert_eq!(out.series.points[idx].value, out.series.points[idx - 1].value);
            prop_assert!(*day < today);
        }
    }

    #[test]
    fn zero_fill_rerun_on_same_day_is_stable((prior, period, rows) in arb_case()) {
        let today = prior.last_day().unwrap() + Duration::days(period);
        let window = window_points(&prior, &rows);

        let first = merge("prop", &prior, &window, today, GapFillPolicy::ZeroFill).unwrap();
        let second = merge("prop", &first.series, &window, today, GapFillPolicy::ZeroFill).unwrap();

        prop_assert_eq!(second.appended(), 0);
        prop_assert_eq!(second.series.points.len(), first.series.points.len());
    }
}
