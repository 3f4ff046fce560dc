//! CSV normalization.
//!
//! Turns decoded CSV text into `RawRecord`s keyed by canonical field names.
//!
//! Rules:
//! - headers found in the translation table are renamed, the rest pass through
//! - configured integer fields must parse as integers, otherwise the whole
//!   import fails (no partial imports)
//! - rows whose cells are all empty are skipped
//! - row order and duplicate rows are preserved

use std::collections::{BTreeMap, HashSet};

use csv::StringRecord;

use crate::config::Config;
use crate::domain::{FieldValue, RawRecord, Snapshot};
use crate::error::PipelineError;

/// Converts source CSV text into typed records.
#[derive(Debug, Clone)]
pub struct Normalizer {
    header_translations: BTreeMap<String, String>,
    integer_fields: HashSet<String>,
}

impl Normalizer {
    pub fn new(header_translations: BTreeMap<String, String>, integer_fields: HashSet<String>) -> Self {
        Self {
            header_translations,
            integer_fields,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.header_translations.clone(), config.integer_field_set())
    }

    /// Build a snapshot from decoded CSV text.
    pub fn snapshot(&self, text: &str, last_update: &str) -> Result<Snapshot, PipelineError> {
        Ok(Snapshot {
            last_update: last_update.to_string(),
            data: self.normalize(text)?,
        })
    }

    /// Parse `text` (first row = header) into records.
    pub fn normalize(&self, text: &str) -> Result<Vec<RawRecord>, PipelineError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::MalformedRecord {
                row: 1,
                reason: format!("failed to read header: {e}"),
            })?
            .clone();
        let header = self.translate_header(&headers);

        let mut out = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            // +2: records start after the header and CSV rows are 1-based.
            let row = idx + 2;
            let record = result.map_err(|e| PipelineError::MalformedRecord {
                row,
                reason: format!("CSV parse error: {e}"),
            })?;

            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            out.push(self.typed_record(row, &header, &record)?);
        }
        Ok(out)
    }

    /// Apply the translation table; unmatched headers pass through unchanged.
    pub fn translate_header(&self, headers: &StringRecord) -> Vec<String> {
        headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                // Spreadsheet exports often prefix the first header with a BOM.
                let name = if idx == 0 { name.trim_start_matches('\u{feff}') } else { name };
                self.header_translations
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string())
            })
            .collect()
    }

    fn typed_record(&self, row: usize, header: &[String], record: &StringRecord) -> Result<RawRecord, PipelineError> {
        if record.len() < header.len() {
            return Err(PipelineError::MalformedRecord {
                row,
                reason: format!("expected {} cells, found {}", header.len(), record.len()),
            });
        }

        let mut out = RawRecord::new();
        for (name, cell) in header.iter().zip(record.iter()) {
            let value = if self.integer_fields.contains(name) {
                let parsed = cell.trim().parse::<i64>().map_err(|_| PipelineError::MalformedRecord {
                    row,
                    reason: format!("field `{name}` has non-integer value '{cell}'"),
                })?;
                FieldValue::Int(parsed)
            } else {
                FieldValue::Text(cell.to_string())
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}
