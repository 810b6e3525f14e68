//! Snapshot persistence.
//!
//! In append mode the output file holds a JSON array of snapshots, oldest first. Prior
//! entries are carried over as raw JSON values so a rewrite never alters them, including
//! key order and fields this crate does not know about. The file is rewritten in place;
//! a crash mid-write can leave it truncated, which the next run treats as empty history.

use crate::config::PersistenceMode;
use crate::error::{DoraError, Result};
use crate::types::MetricsSnapshot;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;

/// Ordered, append-only list of persisted snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsHistory {
    entries: Vec<Value>,
}

impl MetricsHistory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn push(&mut self, snapshot: &MetricsSnapshot) -> Result<()> {
        self.entries.push(serde_json::to_value(snapshot)?);
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }
}

/// Parses persisted history. Never fails: anything that is not a JSON array, including
/// bytes that are not UTF-8, yields an empty history.
pub fn parse_history_or_empty(contents: &[u8]) -> MetricsHistory {
    match serde_json::from_slice::<Value>(contents) {
        Ok(Value::Array(entries)) => MetricsHistory { entries },
        Ok(other) => {
            tracing::warn!(
                kind = json_kind(&other),
                "Existing metrics file is not a list, starting a new history"
            );
            MetricsHistory::default()
        }
        Err(e) => {
            tracing::warn!(
                "Existing metrics file is not valid JSON, starting a new history: {}",
                e
            );
            MetricsHistory::default()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Loads the history at `path`; a missing file is empty history.
pub fn load_history(path: &Path) -> Result<MetricsHistory> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_history_or_empty(&bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(MetricsHistory::default()),
        Err(source) => Err(DoraError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `snapshot` to `path` according to `mode`.
pub fn persist_snapshot(
    path: &Path,
    snapshot: &MetricsSnapshot,
    mode: PersistenceMode,
) -> Result<()> {
    let contents = match mode {
        PersistenceMode::Overwrite => serde_json::to_string_pretty(snapshot)?,
        PersistenceMode::Append => {
            let mut history = load_history(path)?;
            history.push(snapshot)?;
            tracing::debug!(entries = history.len(), "Appending snapshot to history");
            history.to_json_pretty()?
        }
    };

    std::fs::write(path, contents).map_err(|source| DoraError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), ?mode, "Persisted metrics snapshot");
    Ok(())
}

/// Reads every snapshot in `path` for display, oldest first.
///
/// Accepts both layouts: a single object (overwrite mode) reads as one snapshot. Entries
/// that do not parse as snapshots are skipped, and a file that is not JSON at all (for
/// example one truncated by an interrupted write) reads as no snapshots.
pub fn read_snapshots(path: &Path) -> Result<Vec<MetricsSnapshot>> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(DoraError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let entries = match serde_json::from_slice::<Value>(&contents) {
        Ok(Value::Array(entries)) => entries,
        Ok(object @ Value::Object(_)) => vec![object],
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Metrics file is not valid JSON: {}", e);
            Vec::new()
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}
