//! Run configuration.
//!
//! All lookup tables (header translations, integer fields, source URLs) and the
//! per-dataset build definitions live here and are handed to the components
//! that need them. Nothing reads globals.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PipelineError;

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV: &str = "EPI_CONFIG";

/// Config file name used when neither `--config` nor `EPI_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "epi.json";

/// Key of the bare `last_update` string document.
pub const LAST_UPDATE_KEY: &str = "last_update";
/// Key of the per-region tally document.
pub const REGION_COUNTS_KEY: &str = "region_counts";
/// Key of the bare timestamp the map renderer shows.
pub const MAP_UPDATE_KEY: &str = "map_update";

/// Output keys the build phase writes regardless of configuration.
pub const RESERVED_OUTPUTS: [&str; 3] = [LAST_UPDATE_KEY, REGION_COUNTS_KEY, MAP_UPDATE_KEY];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Offset of the publishing region's local time from UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// `chrono` format of date fields in source CSVs.
    #[serde(default = "default_source_date_format")]
    pub source_date_format: String,

    /// Encoding labels tried in order when decoding a fetched payload.
    #[serde(default = "default_codecs")]
    pub codecs: Vec<String>,

    #[serde(default)]
    pub header_translations: BTreeMap<String, String>,

    #[serde(default)]
    pub integer_fields: Vec<String>,

    pub sources: BTreeMap<String, SourceConfig>,

    #[serde(default)]
    pub counts: Vec<CountSeriesConfig>,

    #[serde(default)]
    pub logs: Vec<LogSeriesConfig>,

    #[serde(default)]
    pub details: Vec<DetailConfig>,

    #[serde(default)]
    pub composites: Vec<CompositeConfig>,

    #[serde(default)]
    pub regions: Option<RegionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// `http(s)://` URL, `file://` URL, or a plain filesystem path.
    pub url: String,
}

/// A zero-filled occurrence count series built by aggregating a source by date.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountSeriesConfig {
    pub name: String,
    pub source: String,
    pub date_field: String,
}

/// A carry-forward series built from per-day figures published in a source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSeriesConfig {
    pub name: String,
    pub source: String,
    pub date_field: String,
    pub value_field: String,
}

/// A per-record export with renamed/dropped fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailConfig {
    pub name: String,
    pub source: String,
    /// Old field name -> new field name.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub drop: Vec<String>,
    /// Fields (named after renaming) reformatted to series timestamps.
    #[serde(default)]
    pub date_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeConfig {
    pub name: String,
    pub metrics: Vec<MetricConfig>,
}

/// One output field computed as a signed sum of fields from latest snapshot entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricConfig {
    pub field: String,
    pub terms: Vec<TermConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermConfig {
    pub source: String,
    pub field: String,
    #[serde(default)]
    pub sign: Sign,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    #[default]
    Plus,
    Minus,
}

/// Per-region tally handed to the map renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub source: String,
    pub field: String,
    pub names: Vec<String>,
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_source_date_format() -> String {
    "%Y/%m/%d".to_string()
}

fn default_codecs() -> Vec<String> {
    vec!["utf-8".to_string(), "shift_jis".to_string()]
}

impl Config {
    /// Resolve the config path: explicit flag, then `EPI_CONFIG` (`.env` honored), then `epi.json`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        dotenvy::dotenv().ok();
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let config: Config = serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject references to undeclared sources and clashing output names.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(PipelineError::Config(format!(
                "utc_offset_hours {} is out of range",
                self.utc_offset_hours
            )));
        }
        if self.codecs.is_empty() {
            return Err(PipelineError::Config("at least one codec is required".to_string()));
        }
        for label in &self.codecs {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(PipelineError::Config(format!("unknown codec '{label}'")));
            }
        }

        let mut referenced: Vec<(&str, &str)> = Vec::new();
        referenced.extend(self.counts.iter().map(|c| (c.name.as_str(), c.source.as_str())));
        referenced.extend(self.logs.iter().map(|c| (c.name.as_str(), c.source.as_str())));
        referenced.extend(self.details.iter().map(|c| (c.name.as_str(), c.source.as_str())));
        for composite in &self.composites {
            for metric in &composite.metrics {
                for term in &metric.terms {
                    referenced.push((composite.name.as_str(), term.source.as_str()));
                }
            }
        }
        if let Some(regions) = &self.regions {
            referenced.push((REGION_COUNTS_KEY, regions.source.as_str()));
        }
        for (name, source) in referenced {
            if !self.sources.contains_key(source) {
                return Err(PipelineError::Config(format!(
                    "`{name}` references undeclared source `{source}`"
                )));
            }
        }

        let mut seen = HashSet::new();
        for name in self.output_names() {
            if RESERVED_OUTPUTS.contains(&name) {
                return Err(PipelineError::Config(format!("output name `{name}` is reserved")));
            }
            if !seen.insert(name) {
                return Err(PipelineError::Config(format!("duplicate output name `{name}`")));
            }
        }
        Ok(())
    }

    /// Every dataset name the build phase writes, in build order.
    pub fn output_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.counts.iter().map(|c| c.name.as_str()));
        names.extend(self.details.iter().map(|c| c.name.as_str()));
        names.extend(self.logs.iter().map(|c| c.name.as_str()));
        names.extend(self.composites.iter().map(|c| c.name.as_str()));
        names
    }

    pub fn integer_field_set(&self) -> HashSet<String> {
        self.integer_fields.iter().cloned().collect()
    }
}
