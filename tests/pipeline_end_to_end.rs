//! End-to-end fetch + build over real directories and local CSV sources.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use epi_series::app::pipeline::{BuildContext, run_build, run_fetch};
use epi_series::config::Config;
use epi_series::data::AnySource;
use epi_series::engine::{Clock, FixedClock};
use epi_series::io::store::{JsonDirStore, load_series};

const CONFIG: &str = r#"{
    "utc_offset_hours": 9,
    "codecs": ["utf-8", "shift_jis"],
    "header_translations": {
        "受付_年月日": "日付",
        "相談件数": "小計"
    },
    "integer_fields": ["小計", "検査実施_件数", "入院", "退院", "死亡"],
    "sources": {
        "patients": { "url": "csv/patients.csv" },
        "inspections": { "url": "csv/inspections.csv" },
        "querents": { "url": "csv/querents.csv" },
        "hospitalizations": { "url": "csv/hospitalizations.csv" }
    },
    "counts": [
        { "name": "patients_cnt", "source": "patients", "date_field": "公表日" }
    ],
    "logs": [
        { "name": "inspections", "source": "inspections", "date_field": "実施年月日", "value_field": "検査実施_件数" },
        { "name": "querents", "source": "querents", "date_field": "日付", "value_field": "小計" }
    ],
    "details": [
        {
            "name": "patients",
            "source": "patients",
            "rename": { "市区町村名": "居住地", "患者_年代": "年代" },
            "drop": ["都道府県名", "全国地方公共団体コード"],
            "date_fields": ["公表日"]
        }
    ],
    "composites": [
        {
            "name": "hospitalizations",
            "metrics": [
                { "field": "入院中", "terms": [ { "source": "hospitalizations", "field": "入院" } ] },
                { "field": "退院", "terms": [ { "source": "hospitalizations", "field": "退院" } ] },
                { "field": "死亡", "terms": [ { "source": "hospitalizations", "field": "死亡" } ] },
                {
                    "field": "陽性患者数",
                    "terms": [
                        { "source": "hospitalizations", "field": "入院" },
                        { "source": "hospitalizations", "field": "退院" }
                    ]
                }
            ]
        }
    ],
    "regions": {
        "source": "patients",
        "field": "市区町村名",
        "names": ["下関市", "宇部市", "山口市"]
    }
}"#;

const PATIENTS: &str = "\
全国地方公共団体コード,都道府県名,市区町村名,公表日,患者_年代
350001,山口県,山口市,2021/05/11,30代
350001,山口県,下関市,2021/05/11,20代
350001,山口県,山口市,2021/05/13,40代
";

const INSPECTIONS: &str = "\
実施年月日,検査実施_件数
2021/05/13,45
";

const HOSPITALIZATIONS: &str = "\
日付,入院,退院,死亡
2021/05/12,100,80,2
2021/05/13,104,82,2
";

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, m, d).unwrap()
}

fn write(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn seed_series(dir: &Path, key: &str, last: &str, value: u64) {
    let json = format!(
        r#"{{"last_update": "2021/05/10 10:00", "data": [{{"日付": "{last}T08:00:00.000Z", "小計": {value}}}]}}"#
    );
    write(&dir.join(format!("{key}.json")), json.as_bytes());
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn daily_job_builds_every_output() {
    let root = tempfile::tempdir().unwrap();
    let root = root.path();

    write(&root.join("csv/patients.csv"), PATIENTS.as_bytes());
    write(&root.join("csv/inspections.csv"), INSPECTIONS.as_bytes());
    write(&root.join("csv/hospitalizations.csv"), HOSPITALIZATIONS.as_bytes());
    // Shift_JIS-encoded source, as some portals still publish.
    let (querents, _, _) = encoding_rs::SHIFT_JIS.encode("受付_年月日,相談件数\n2021/05/13,8\n");
    write(&root.join("csv/querents.csv"), &querents);

    let previous = root.join("previous_data");
    seed_series(&previous, "patients_cnt", "2021-05-10", 12);
    seed_series(&previous, "inspections", "2021-05-10", 40);
    seed_series(&previous, "querents", "2021-05-10", 5);

    let config = Config::from_json(CONFIG).unwrap();
    let clock = FixedClock::at(day(5, 13), NaiveTime::from_hms_opt(20, 30, 0).unwrap(), 9).unwrap();
    let origin = JsonDirStore::new(root.join("origin_data"));
    let previous = JsonDirStore::new(previous);
    let output = JsonDirStore::new(root.join("data"));

    let fetched = run_fetch(&config, &AnySource::new(root), &clock, &origin);
    assert!(fetched.failures.is_empty(), "{:?}", fetched.failures);
    assert_eq!(fetched.fetched.len(), 4);

    let report = run_build(&BuildContext {
        config: &config,
        origin: &origin,
        previous: &previous,
        output: &output,
        today: clock.today(),
        failed_sources: BTreeSet::new(),
    });
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    // Zero-filled counts.
    let counts = load_series(&output, "patients_cnt").unwrap();
    let got: Vec<(NaiveDate, u64)> = counts.points.iter().map(|p| (p.date, p.value)).collect();
    assert_eq!(
        got,
        vec![(day(5, 10), 12), (day(5, 11), 2), (day(5, 12), 0), (day(5, 13), 1)]
    );
    assert_eq!(counts.last_update, "2021/05/13 20:30");

    // Carry-forward logs.
    let inspections = load_series(&output, "inspections").unwrap();
    let values: Vec<u64> = inspections.points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![40, 40, 40, 45]);
    let querents = load_series(&output, "querents").unwrap();
    let values: Vec<u64> = querents.points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![5, 5, 5, 8]);

    // Reshaped details.
    let patients = read_json(&output.path_for("patients"));
    assert_eq!(patients["data"][0]["居住地"], "山口市");
    assert_eq!(patients["data"][0]["公表日"], "2021-05-11T08:00:00.000Z");
    assert!(patients["data"][0].get("都道府県名").is_none());

    // Composite from the latest hospitalization row.
    let hosp = read_json(&output.path_for("hospitalizations"));
    assert_eq!(hosp["data"][0]["入院中"], 104);
    assert_eq!(hosp["data"][0]["陽性患者数"], 186);

    // Region tally and bare timestamps.
    let regions = read_json(&output.path_for("region_counts"));
    assert_eq!(regions["data"][0]["region"], "下関市");
    assert_eq!(regions["data"][0]["count"], 1);
    assert_eq!(regions["data"][2]["count"], 2);
    assert_eq!(read_json(&output.path_for("map_update")), "2021/05/13 20:30");
    assert_eq!(read_json(&output.path_for("last_update")), "2021/05/13 20:30");
}

#[test]
fn next_day_run_extends_yesterdays_output() {
    let root = tempfile::tempdir().unwrap();
    let root = root.path();
    write(&root.join("csv/patients.csv"), PATIENTS.as_bytes());
    write(&root.join("csv/inspections.csv"), INSPECTIONS.as_bytes());
    write(&root.join("csv/hospitalizations.csv"), HOSPITALIZATIONS.as_bytes());
    write(&root.join("csv/querents.csv"), "受付_年月日,相談件数\n2021/05/13,8\n".as_bytes());

    let seed = root.join("seed");
    seed_series(&seed, "patients_cnt", "2021-05-10", 12);
    seed_series(&seed, "inspections", "2021-05-10", 40);
    seed_series(&seed, "querents", "2021-05-10", 5);

    let config = Config::from_json(CONFIG).unwrap();
    let origin = JsonDirStore::new(root.join("origin_data"));
    let day1 = JsonDirStore::new(root.join("day1"));
    let day2 = JsonDirStore::new(root.join("day2"));
    let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

    let clock = FixedClock::at(day(5, 13), time, 9).unwrap();
    run_fetch(&config, &AnySource::new(root), &clock, &origin);
    let first = run_build(&BuildContext {
        config: &config,
        origin: &origin,
        previous: &JsonDirStore::new(&seed),
        output: &day1,
        today: clock.today(),
        failed_sources: BTreeSet::new(),
    });
    assert!(first.failures.is_empty(), "{:?}", first.failures);

    // Saturday: the portal published nothing new.
    let clock = FixedClock::at(day(5, 15), time, 9).unwrap();
    let second = run_build(&BuildContext {
        config: &config,
        origin: &origin,
        previous: &day1,
        output: &day2,
        today: clock.today(),
        failed_sources: BTreeSet::new(),
    });
    assert!(second.failures.is_empty(), "{:?}", second.failures);

    let counts = load_series(&day2, "patients_cnt").unwrap();
    assert_eq!(counts.last_day(), Some(day(5, 15)));
    assert!(counts.gaps().is_empty());

    let inspections = load_series(&day2, "inspections").unwrap();
    let tail: Vec<(NaiveDate, u64)> = inspections.points.iter().rev().take(2).map(|p| (p.date, p.value)).collect();
    assert_eq!(tail, vec![(day(5, 14), 45), (day(5, 13), 45)]);
}

#[test]
fn corrupt_previous_series_fails_only_that_dataset() {
    let root = tempfile::tempdir().unwrap();
    let root = root.path();
    write(&root.join("csv/patients.csv"), PATIENTS.as_bytes());
    write(&root.join("csv/inspections.csv"), INSPECTIONS.as_bytes());
    write(&root.join("csv/hospitalizations.csv"), HOSPITALIZATIONS.as_bytes());
    write(&root.join("csv/querents.csv"), "受付_年月日,相談件数\n2021/05/13,8\n".as_bytes());

    let previous = root.join("previous_data");
    write(&previous.join("patients_cnt.json"), br#"{"last_update": "x", "data": []}"#);
    seed_series(&previous, "inspections", "2021-05-10", 40);
    seed_series(&previous, "querents", "2021-05-10", 5);

    let config = Config::from_json(CONFIG).unwrap();
    let clock = FixedClock::at(day(5, 13), NaiveTime::from_hms_opt(9, 0, 0).unwrap(), 9).unwrap();
    let origin = JsonDirStore::new(root.join("origin_data"));
    let output = JsonDirStore::new(root.join("data"));
    run_fetch(&config, &AnySource::new(root), &clock, &origin);

    let report = run_build(&BuildContext {
        config: &config,
        origin: &origin,
        previous: &JsonDirStore::new(&previous),
        output: &output,
        today: clock.today(),
        failed_sources: BTreeSet::new(),
    });

    assert_eq!(report.failures.len(), 1);
    let message = report.failures[0].to_string();
    assert!(message.starts_with("[patients_cnt] corrupt series"), "{message}");
    assert!(!output.path_for("patients_cnt").exists());
    assert!(output.path_for("inspections").exists());
}
