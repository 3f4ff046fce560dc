//! Fetch and build pipelines shared by the `fetch`, `build` and `run` commands.
//!
//! Fetch: source -> decode -> normalize -> origin store.
//! Build: origin + previous stores -> aggregate / merge / reshape / compose -> output store.
//!
//! Each dataset is computed completely in memory and written only on success,
//! so a failure leaves the previously published document untouched. Failures
//! are collected per dataset; the other datasets still run. An output whose
//! source failed to fetch in the same run is not built from the stale origin
//! snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{error, info};

use crate::config::{CompositeConfig, Config, CountSeriesConfig, DetailConfig, LogSeriesConfig, RegionConfig};
use crate::data::{RawRecordSource, decode_text};
use crate::domain::{GapFillPolicy, Snapshot};
use crate::engine::{self, Clock, MergeOutcome};
use crate::error::{AppError, PipelineError};
use crate::io::normalize::Normalizer;
use crate::io::store::{Store, load_json, load_series, load_snapshot, save_json};

pub use crate::config::{LAST_UPDATE_KEY, MAP_UPDATE_KEY, REGION_COUNTS_KEY};

/// One source fetched into the origin store.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub key: String,
    pub records: usize,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub last_update: String,
    pub fetched: Vec<FetchedSource>,
    /// Keys of sources whose fetch failed.
    pub failed_sources: BTreeSet<String>,
    pub failures: Vec<AppError>,
}

/// Fetch every configured source into `origin`.
///
/// `last_update` is written only when every source succeeded.
pub fn run_fetch(
    config: &Config,
    source: &dyn RawRecordSource,
    clock: &dyn Clock,
    origin: &dyn Store,
) -> FetchReport {
    let normalizer = Normalizer::from_config(config);
    let mut report = FetchReport {
        last_update: clock.last_update(),
        ..FetchReport::default()
    };

    for (key, source_config) in &config.sources {
        info!(dataset = %key, url = %source_config.url, "fetching source");
        let result = fetch_snapshot(config, &normalizer, source, &source_config.url, &report.last_update)
            .and_then(|snapshot| {
                save_json(origin, key, &snapshot)?;
                Ok(snapshot.data.len())
            });
        match result {
            Ok(records) => {
                info!(dataset = %key, records, "source saved");
                report.fetched.push(FetchedSource {
                    key: key.clone(),
                    records,
                });
            }
            Err(err) => {
                error!(dataset = %key, error = %err, "fetch failed");
                report.failed_sources.insert(key.clone());
                report.failures.push(AppError::for_dataset(key, &err));
            }
        }
    }

    if report.failures.is_empty() {
        if let Err(err) = save_json(origin, LAST_UPDATE_KEY, &report.last_update) {
            report.failures.push(AppError::for_dataset(LAST_UPDATE_KEY, &err));
        }
    }
    report
}

fn fetch_snapshot(
    config: &Config,
    normalizer: &Normalizer,
    source: &dyn RawRecordSource,
    url: &str,
    last_update: &str,
) -> Result<Snapshot, PipelineError> {
    let bytes = source.fetch(url)?;
    let text = decode_text(&bytes, &config.codecs)?;
    normalizer.snapshot(&text, last_update)
}

/// What kind of document a build step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    LastUpdate,
    Counts,
    Detail,
    Log,
    Composite,
    Regions,
}

impl OutputKind {
    pub fn label(self) -> &'static str {
        match self {
            OutputKind::LastUpdate => "last-update",
            OutputKind::Counts => "counts",
            OutputKind::Detail => "detail",
            OutputKind::Log => "log",
            OutputKind::Composite => "composite",
            OutputKind::Regions => "regions",
        }
    }
}

/// Summary of one written output.
#[derive(Debug, Clone)]
pub struct BuildEntry {
    pub name: String,
    pub kind: OutputKind,
    /// Points or records in the written document.
    pub rows: usize,
    pub observed: usize,
    pub synthesized: usize,
    pub revised: bool,
}

impl BuildEntry {
    fn document(name: &str, kind: OutputKind, rows: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            rows,
            observed: 0,
            synthesized: 0,
            revised: false,
        }
    }

    fn merged(name: &str, kind: OutputKind, outcome: &MergeOutcome) -> Self {
        Self {
            name: name.to_string(),
            kind,
            rows: outcome.series.points.len(),
            observed: outcome.observed.len(),
            synthesized: outcome.synthesized.len(),
            revised: outcome.revised,
        }
    }
}

#[derive(Debug)]
pub struct BuildReport {
    pub today: NaiveDate,
    pub entries: Vec<BuildEntry>,
    pub failures: Vec<AppError>,
}

/// Stores and date a build runs against.
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub origin: &'a dyn Store,
    pub previous: &'a dyn Store,
    pub output: &'a dyn Store,
    pub today: NaiveDate,
    /// Sources that failed to fetch in this run; outputs reading them fail.
    pub failed_sources: BTreeSet<String>,
}

/// Build every configured output.
pub fn run_build(ctx: &BuildContext<'_>) -> BuildReport {
    let mut report = BuildReport {
        today: ctx.today,
        entries: Vec::new(),
        failures: Vec::new(),
    };
    let mut record = |name: &str, result: Result<BuildEntry, PipelineError>| match result {
        Ok(entry) => {
            info!(
                dataset = %entry.name,
                kind = entry.kind.label(),
                rows = entry.rows,
                observed = entry.observed,
                synthesized = entry.synthesized,
                revised = entry.revised,
                "output written"
            );
            report.entries.push(entry);
        }
        Err(err) => {
            error!(dataset = %name, error = %err, "build failed");
            report.failures.push(AppError::for_dataset(name, &err));
        }
    };

    record(LAST_UPDATE_KEY, build_last_update(ctx));
    for counts in &ctx.config.counts {
        record(&counts.name, build_counts(ctx, counts));
    }
    for detail in &ctx.config.details {
        record(&detail.name, build_detail(ctx, detail));
    }
    for log in &ctx.config.logs {
        record(&log.name, build_log(ctx, log));
    }
    for composite in &ctx.config.composites {
        record(&composite.name, build_composite(ctx, composite));
    }
    if let Some(regions) = &ctx.config.regions {
        record(REGION_COUNTS_KEY, build_regions(ctx, regions));
    }

    report
}

/// Fetch then build against one clock, so both phases agree on `today`.
pub fn run_daily(
    config: &Config,
    source: &dyn RawRecordSource,
    clock: &dyn Clock,
    stores: DailyStores<'_>,
) -> (FetchReport, BuildReport) {
    let fetched = run_fetch(config, source, clock, stores.origin);
    let ctx = BuildContext {
        config,
        origin: stores.origin,
        previous: stores.previous,
        output: stores.output,
        today: clock.today(),
        failed_sources: fetched.failed_sources.clone(),
    };
    let built = run_build(&ctx);
    (fetched, built)
}

/// The three stores a daily run touches.
#[derive(Clone, Copy)]
pub struct DailyStores<'a> {
    pub origin: &'a dyn Store,
    pub previous: &'a dyn Store,
    pub output: &'a dyn Store,
}

fn ensure_fetched<'s>(
    ctx: &BuildContext<'_>,
    sources: impl IntoIterator<Item = &'s str>,
) -> Result<(), PipelineError> {
    for source in sources {
        if ctx.failed_sources.contains(source) {
            return Err(PipelineError::SourceUnavailable {
                source_key: source.to_string(),
            });
        }
    }
    Ok(())
}

fn build_last_update(ctx: &BuildContext<'_>) -> Result<BuildEntry, PipelineError> {
    let last_update: String = load_json(ctx.origin, LAST_UPDATE_KEY)?;
    save_json(ctx.output, LAST_UPDATE_KEY, &last_update)?;
    Ok(BuildEntry::document(LAST_UPDATE_KEY, OutputKind::LastUpdate, 1))
}

fn build_counts(ctx: &BuildContext<'_>, counts: &CountSeriesConfig) -> Result<BuildEntry, PipelineError> {
    ensure_fetched(ctx, [counts.source.as_str()])?;
    let snapshot = load_snapshot(ctx.origin, &counts.source)?;
    let daily = engine::daily_counts(&snapshot.data, &counts.date_field, &ctx.config.source_date_format)?;
    let prior = load_series(ctx.previous, &counts.name)?;

    let mut outcome = engine::merge(&counts.name, &prior, &daily.to_points(), ctx.today, GapFillPolicy::ZeroFill)?;
    outcome.series.last_update = snapshot.last_update;

    save_json(ctx.output, &counts.name, &outcome.series)?;
    Ok(BuildEntry::merged(&counts.name, OutputKind::Counts, &outcome))
}

fn build_log(ctx: &BuildContext<'_>, log: &LogSeriesConfig) -> Result<BuildEntry, PipelineError> {
    ensure_fetched(ctx, [log.source.as_str()])?;
    let snapshot = load_snapshot(ctx.origin, &log.source)?;
    let window = engine::to_daily_points(
        &log.source,
        &snapshot.data,
        &log.date_field,
        &log.value_field,
        &ctx.config.source_date_format,
    )?;
    let prior = load_series(ctx.previous, &log.name)?;

    let mut outcome = engine::merge(&log.name, &prior, &window, ctx.today, GapFillPolicy::CarryForward)?;
    outcome.series.last_update = snapshot.last_update;

    save_json(ctx.output, &log.name, &outcome.series)?;
    Ok(BuildEntry::merged(&log.name, OutputKind::Log, &outcome))
}

fn build_detail(ctx: &BuildContext<'_>, detail: &DetailConfig) -> Result<BuildEntry, PipelineError> {
    ensure_fetched(ctx, [detail.source.as_str()])?;
    let snapshot = load_snapshot(ctx.origin, &detail.source)?;
    let reshaped = engine::reshape_details(&detail.source, &snapshot, detail, &ctx.config.source_date_format)?;
    save_json(ctx.output, &detail.name, &reshaped)?;
    Ok(BuildEntry::document(&detail.name, OutputKind::Detail, reshaped.data.len()))
}

fn build_composite(ctx: &BuildContext<'_>, composite: &CompositeConfig) -> Result<BuildEntry, PipelineError> {
    let terms = composite.metrics.iter().flat_map(|m| &m.terms);
    ensure_fetched(ctx, terms.map(|t| t.source.as_str()))?;
    let prior = match load_snapshot(ctx.previous, &composite.name) {
        Ok(prior) => prior,
        Err(PipelineError::NotFound { .. }) => {
            info!(dataset = %composite.name, "no previous document, starting empty");
            Snapshot {
                last_update: String::new(),
                data: Vec::new(),
            }
        }
        Err(err) => return Err(err),
    };

    let mut sources = BTreeMap::new();
    for metric in &composite.metrics {
        for term in &metric.terms {
            if !sources.contains_key(&term.source) {
                sources.insert(term.source.clone(), load_snapshot(ctx.origin, &term.source)?);
            }
        }
    }

    let composed = engine::compose(&prior, &sources, composite)?;
    save_json(ctx.output, &composite.name, &composed)?;
    Ok(BuildEntry::document(&composite.name, OutputKind::Composite, composed.data.len()))
}

fn build_regions(ctx: &BuildContext<'_>, regions: &RegionConfig) -> Result<BuildEntry, PipelineError> {
    ensure_fetched(ctx, [regions.source.as_str()])?;
    let snapshot = load_snapshot(ctx.origin, &regions.source)?;
    let counts = engine::region_counts(&regions.source, &snapshot, regions)?;
    save_json(ctx.output, REGION_COUNTS_KEY, &counts)?;
    save_json(ctx.output, MAP_UPDATE_KEY, &counts.last_update)?;
    Ok(BuildEntry::document(REGION_COUNTS_KEY, OutputKind::Regions, counts.data.len()))
}
