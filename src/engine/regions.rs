//! Per-region case tally for the map renderer.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RegionConfig;
use crate::domain::Snapshot;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub region: String,
    pub count: u64,
}

/// Tally of records per region, in configured order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCounts {
    pub last_update: String,
    pub data: Vec<RegionCount>,
}

impl RegionCounts {
    pub fn get(&self, region: &str) -> Option<u64> {
        self.data.iter().find(|r| r.region == region).map(|r| r.count)
    }

    pub fn total(&self) -> u64 {
        self.data.iter().map(|r| r.count).sum()
    }
}

/// Count records of `snapshot` by `regions.field`.
///
/// Every configured region is present (zero when absent). Regions not in the
/// configured list are appended after it, in order of first appearance.
pub fn region_counts(source_key: &str, snapshot: &Snapshot, regions: &RegionConfig) -> Result<RegionCounts, PipelineError> {
    let mut data: Vec<RegionCount> = regions
        .names
        .iter()
        .map(|name| RegionCount {
            region: name.clone(),
            count: 0,
        })
        .collect();

    for record in &snapshot.data {
        let region = record
            .get(&regions.field)
            .ok_or_else(|| PipelineError::MissingField {
                source_key: source_key.to_string(),
                field: regions.field.clone(),
            })?
            .to_string();

        match data.iter_mut().find(|r| r.region == region) {
            Some(entry) => entry.count += 1,
            None => {
                warn!(region = %region, "region not in configured list");
                data.push(RegionCount { region, count: 1 });
            }
        }
    }

    Ok(RegionCounts {
        last_update: snapshot.last_update.clone(),
        data,
    })
}
