//! Keyed JSON document storage.
//!
//! A store maps a logical dataset key (`patients_cnt`, `inspections`, ...) to one
//! JSON document. The directory-backed store writes `<dir>/<key>.json`
//! atomically: content goes to a temp file which is flushed, synced and then
//! renamed over the destination, so readers only ever see complete documents.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::PrettyFormatter;
use tracing::debug;

use crate::domain::{DailySeries, Snapshot};
use crate::error::PipelineError;

/// Load/save of raw documents by key.
pub trait Store {
    fn load_text(&self, key: &str) -> Result<String, PipelineError>;
    fn save_text(&self, key: &str, contents: &str) -> Result<(), PipelineError>;
}

/// Deserialize the document stored under `key`.
pub fn load_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<T, PipelineError> {
    let text = store.load_text(key)?;
    serde_json::from_str(&text).map_err(|source| PipelineError::Json {
        key: key.to_string(),
        source,
    })
}

/// Serialize `value` (4-space indent, non-ASCII kept verbatim) under `key`.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<(), PipelineError> {
    let text = to_pretty_json(value).map_err(|source| PipelineError::Json {
        key: key.to_string(),
        source,
    })?;
    store.save_text(key, &text)
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Load a persisted series, checking the ordering invariant.
///
/// Any decoding problem (including an unparseable `日付`) is reported as a
/// corrupt series, since the merge cannot establish its last day.
pub fn load_series(store: &dyn Store, key: &str) -> Result<DailySeries, PipelineError> {
    let text = store.load_text(key)?;
    let series: DailySeries = serde_json::from_str(&text).map_err(|e| PipelineError::CorruptSeries {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    if !series.is_strictly_increasing() {
        return Err(PipelineError::CorruptSeries {
            key: key.to_string(),
            reason: "dates are not strictly increasing".to_string(),
        });
    }
    Ok(series)
}

pub fn load_snapshot(store: &dyn Store, key: &str) -> Result<Snapshot, PipelineError> {
    load_json(store, key)
}

/// Directory of `<key>.json` files.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for JsonDirStore {
    fn load_text(&self, key: &str) -> Result<String, PipelineError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::NotFound {
                key: path.display().to_string(),
            }),
            Err(source) => Err(PipelineError::Io { path, source }),
        }
    }

    fn save_text(&self, key: &str, contents: &str) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PipelineError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));
        let mut guard = TempFileGuard::new(tmp_path.clone());

        {
            let io_err = |source| PipelineError::Io {
                path: tmp_path.clone(),
                source,
            };
            let file = File::create(&tmp_path).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(contents.as_bytes()).map_err(io_err)?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
            writer.get_ref().sync_all().map_err(io_err)?;
        }

        std::fs::rename(&tmp_path, &final_path).map_err(|source| PipelineError::Io {
            path: final_path.clone(),
            source,
        })?;
        guard.disarm();

        debug!(path = %final_path.display(), "saved");
        Ok(())
    }
}

/// Removes the temp file on drop unless the write completed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.docs.borrow().keys().cloned().collect()
    }
}

impl Store for MemoryStore {
    fn load_text(&self, key: &str) -> Result<String, PipelineError> {
        self.docs
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound { key: key.to_string() })
    }

    fn save_text(&self, key: &str, contents: &str) -> Result<(), PipelineError> {
        self.docs.borrow_mut().insert(key.to_string(), contents.to_string());
        Ok(())
    }
}
