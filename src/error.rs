//! Error types.
//!
//! `PipelineError` is what the library returns; every variant is fatal for the
//! dataset being processed. `AppError` is the CLI-facing wrapper that carries a
//! process exit code.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures raised while fetching, normalizing, merging or persisting a dataset.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    #[error("unparseable date '{value}' in field `{field}` (expected format {format})")]
    DateParse {
        field: String,
        value: String,
        format: String,
    },

    #[error("corrupt series `{key}`: {reason}")]
    CorruptSeries { key: String, reason: String },

    #[error("clock skew: {day} is after today ({today})")]
    ClockSkew { day: NaiveDate, today: NaiveDate },

    #[error("missing field `{field}` in latest entry of `{source_key}`")]
    MissingField { source_key: String, field: String },

    #[error("`{key}` not found in store")]
    NotFound { key: String },

    #[error("failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error("source `{source_key}` was not fetched in this run")]
    SourceUnavailable { source_key: String },

    #[error("none of the configured codecs ({codecs}) could decode the payload")]
    Decode { codecs: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON for `{key}`: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Exit code used when this error ends the process.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::MalformedRecord { .. }
            | PipelineError::DateParse { .. }
            | PipelineError::CorruptSeries { .. }
            | PipelineError::ClockSkew { .. }
            | PipelineError::MissingField { .. }
            | PipelineError::NotFound { .. } => 3,
            PipelineError::Fetch { .. }
            | PipelineError::SourceUnavailable { .. }
            | PipelineError::Decode { .. }
            | PipelineError::Io { .. }
            | PipelineError::Json { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Attach the dataset name so the user can tell which pipeline failed.
    pub fn for_dataset(dataset: &str, err: &PipelineError) -> Self {
        Self::new(err.exit_code(), format!("[{dataset}] {err}"))
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
