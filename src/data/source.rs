//! Raw record sources: where CSV bytes come from.
//!
//! No retries: a failed fetch fails that dataset for this run.

use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::PipelineError;

/// Supplies the raw bytes behind a configured source URL.
pub trait RawRecordSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Blocking HTTP(S) source.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RawRecordSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        debug!(url, "fetching");
        let resp = self.client.get(url).send().map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            message: format!("request failed: {e}"),
        })?;

        if !resp.status().is_success() {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                message: format!("HTTP status {}", resp.status()),
            });
        }

        let body = resp.bytes().map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            message: format!("failed to read body: {e}"),
        })?;
        Ok(body.to_vec())
    }
}

/// Local-file source for `file://` URLs and plain paths.
///
/// Relative paths resolve against `base` (the config file's directory).
pub struct FileSource {
    base: PathBuf,
}

impl FileSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl RawRecordSource for FileSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.resolve(url);
        debug!(path = %path.display(), "reading local source");
        std::fs::read(&path).map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            message: format!("failed to read '{}': {e}", path.display()),
        })
    }
}

/// Dispatches on URL scheme: http(s) goes over the network, anything else is a file.
pub struct AnySource {
    http: HttpSource,
    file: FileSource,
}

impl AnySource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            http: HttpSource::new(),
            file: FileSource::new(base),
        }
    }
}

impl RawRecordSource for AnySource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        if is_http(url) {
            self.http.fetch(url)
        } else {
            self.file.fetch(url)
        }
    }
}

fn is_http(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_detection() {
        assert!(is_http("https://example.com/a.csv"));
        assert!(is_http("HTTP://example.com/a.csv"));
        assert!(!is_http("file:///tmp/a.csv"));
        assert!(!is_http("data/a.csv"));
    }

    #[test]
    fn file_source_resolves_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), b"x,y\n1,2\n").unwrap();

        let source = FileSource::new(dir.path());
        assert_eq!(source.fetch("a.csv").unwrap(), b"x,y\n1,2\n");

        let url = format!("file://{}", dir.path().join("a.csv").display());
        assert_eq!(source.fetch(&url).unwrap(), b"x,y\n1,2\n");
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new(dir.path()).fetch("nope.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
    }
}
