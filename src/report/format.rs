//! Terminal output for the CLI.
//!
//! Formatting stays here so the pipeline and engine code only return data.

use crate::app::pipeline::{BuildReport, FetchReport};
use crate::domain::DailySeries;
use crate::engine::RegionCounts;

/// Summary of a fetch run.
pub fn format_fetch_summary(report: &FetchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== epi fetch ({}) ===\n", report.last_update));
    for source in &report.fetched {
        out.push_str(&format!("  {:<24} {:>7} records\n", source.key, source.records));
    }
    if !report.failures.is_empty() {
        out.push_str(&format!("Failed: {}\n", report.failures.len()));
        for failure in &report.failures {
            out.push_str(&format!("  {failure}\n"));
        }
    }
    out
}

/// Summary of a build run: one line per written output.
pub fn format_build_summary(report: &BuildReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== epi build (today: {}) ===\n", report.today));
    out.push_str(&format!(
        "  {:<24} {:<12} {:>7} {:>9} {:>12}\n",
        "output", "kind", "rows", "observed", "synthesized"
    ));
    for entry in &report.entries {
        let revised = if entry.revised { "  (tail revised)" } else { "" };
        out.push_str(&format!(
            "  {:<24} {:<12} {:>7} {:>9} {:>12}{revised}\n",
            entry.name,
            entry.kind.label(),
            entry.rows,
            entry.observed,
            entry.synthesized,
        ));
    }
    if !report.failures.is_empty() {
        out.push_str(&format!("Failed: {}\n", report.failures.len()));
        for failure in &report.failures {
            out.push_str(&format!("  {failure}\n"));
        }
    }
    out
}

/// Shape of a stored series: range, size, total, and any gaps.
pub fn format_series_summary(key: &str, series: &DailySeries) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {key} ===\n"));
    out.push_str(&format!("Last update: {}\n", series.last_update));

    let (Some(first), Some(last)) = (series.first_day(), series.last_day()) else {
        out.push_str("No points.\n");
        return out;
    };
    out.push_str(&format!("Range: {first} .. {last} ({} points)\n", series.points.len()));
    out.push_str(&format!("Total: {}\n", series.total()));

    let gaps = series.gaps();
    if gaps.is_empty() {
        out.push_str("Gaps: none\n");
    } else {
        let shown: Vec<String> = gaps.iter().take(10).map(|d| d.to_string()).collect();
        let more = if gaps.len() > shown.len() {
            format!(" (+{} more)", gaps.len() - shown.len())
        } else {
            String::new()
        };
        out.push_str(&format!("Gaps: {}{more}\n", shown.join(", ")));
    }

    out.push_str("Recent:\n");
    let start = series.points.len().saturating_sub(7);
    for p in &series.points[start..] {
        out.push_str(&format!("  {}  {:>6}\n", p.date, p.value));
    }
    out
}

/// Per-region tally as a two-column table.
pub fn format_region_counts(counts: &RegionCounts) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== regions ({}) ===\n", counts.last_update));
    for entry in &counts.data {
        out.push_str(&format!("  {:<12} {:>5}\n", entry.region, entry.count));
    }
    out.push_str(&format!("  {:<12} {:>5}\n", "total", counts.total()));
    out
}
