// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Preset documents, loading with retries, and flat key-level diffs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::{PresetError, Result};

/// A preset: arbitrary JSON object, key order preserved
pub type Preset = Map<String, Value>;

/// Pause between attempts of a retried file operation
pub const RETRY_PAUSE: Duration = Duration::from_millis(200);

/// One changed key: value on the A side and on the B side (`null` when absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    #[serde(rename = "A")]
    pub a: Value,
    #[serde(rename = "B")]
    pub b: Value,
}

/// Flat key-level diff, ordered by key name
pub type PresetDiff = BTreeMap<String, ValueChange>;

/// Run an I/O operation up to `attempts` times.
///
/// `NotFound` is never retried since waiting will not make the file appear.
pub fn retry_io<T>(op: &str, attempts: u32, mut f: impl FnMut() -> io::Result<T>) -> Result<T> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e.into()),
            Err(e) => {
                warn!("{} failed: {}, retry {}/{}", op, e, attempt, attempts);
                if attempt < attempts {
                    thread::sleep(RETRY_PAUSE);
                }
            }
        }
    }
    Err(PresetError::RetriesExhausted { op: op.to_string(), attempts })
}

/// Convert a parsed JSON document into a preset
pub fn into_preset(value: Value, origin: &str) -> Result<Preset> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PresetError::InvalidPreset(format!(
            "{} is a JSON {}, expected an object",
            origin,
            json_kind(&other)
        ))),
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

/// Load a preset file, retrying transient read failures
pub fn load_preset(path: &Path, retries: u32) -> Result<Preset> {
    let op = format!("Reading {}", path.display());
    let content = retry_io(&op, retries, || std::fs::read_to_string(path))?;
    let value: Value = serde_json::from_str(&content)?;
    into_preset(value, &path.display().to_string())
}

/// Write a preset as pretty JSON
pub fn write_preset(path: &Path, preset: &Preset) -> Result<()> {
    let content = serde_json::to_string_pretty(preset)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Compare two presets key by key.
///
/// A key missing on one side counts as `null`, so `{"k": null}` and `{}`
/// compare equal.
pub fn diff_presets(a: &Preset, b: &Preset) -> PresetDiff {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    let mut diff = PresetDiff::new();
    for key in keys {
        let va = a.get(key).cloned().unwrap_or(Value::Null);
        let vb = b.get(key).cloned().unwrap_or(Value::Null);
        if va != vb {
            diff.insert(key.clone(), ValueChange { a: va, b: vb });
        }
    }
    diff
}

/// Render a diff as `key: old -> new` lines
pub fn diff_lines(diff: &PresetDiff) -> Vec<String> {
    diff.iter()
        .map(|(key, change)| format!("{}: {} -> {}", key, change.a, change.b))
        .collect()
}

/// Counts from a directory-to-directory comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkDiffSummary {
    pub compared: usize,
    pub changed: usize,
}

/// Names of `*.json` files directly inside `dir`
pub fn json_files(dir: &Path) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".json") && entry.path().is_file() {
            files.insert(name);
        }
    }
    Ok(files)
}

/// Diff every preset present in both directories.
///
/// Files that fail to load are logged and left out of the report.
pub fn diff_directories(
    dir_a: &Path,
    dir_b: &Path,
    retries: u32,
) -> Result<(BTreeMap<String, PresetDiff>, BulkDiffSummary)> {
    let files_a = json_files(dir_a)?;
    let files_b = json_files(dir_b)?;
    let common: Vec<&String> = files_a.intersection(&files_b).collect();

    let mut report = BTreeMap::new();
    let mut summary = BulkDiffSummary { compared: common.len(), changed: 0 };

    for (idx, name) in common.iter().enumerate() {
        let loaded = load_preset(&dir_a.join(name), retries)
            .and_then(|a| load_preset(&dir_b.join(name), retries).map(|b| (a, b)));
        match loaded {
            Ok((a, b)) => {
                let diff = diff_presets(&a, &b);
                if !diff.is_empty() {
                    report.insert((*name).clone(), diff);
                    summary.changed += 1;
                }
            }
            Err(e) => warn!("Diff failed for {}: {}", name, e),
        }
        if (idx + 1) % 10 == 0 || idx + 1 == common.len() {
            tracing::debug!("[{}/{}] processed", idx + 1, common.len());
        }
    }

    Ok((report, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn preset(value: Value) -> Preset {
        into_preset(value, "test").unwrap()
    }

    #[test]
    fn test_identical_presets_have_empty_diff() {
        let a = preset(json!({"x": 1, "nested": {"y": [1, 2]}}));
        assert!(diff_presets(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_and_added_keys() {
        let a = preset(json!({"x": 1}));
        let b = preset(json!({"x": 2, "y": 3}));
        let diff = diff_presets(&a, &b);

        assert_eq!(
            serde_json::to_value(&diff).unwrap(),
            json!({"x": {"A": 1, "B": 2}, "y": {"A": null, "B": 3}})
        );
    }

    #[test]
    fn test_diff_keys_are_sorted() {
        let a = preset(json!({"zeta": 1, "alpha": 1}));
        let b = preset(json!({"zeta": 2, "alpha": 2}));
        let keys: Vec<_> = diff_presets(&a, &b).into_keys().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_null_and_missing_are_equal() {
        let a = preset(json!({"k": null}));
        let b = preset(json!({}));
        assert!(diff_presets(&a, &b).is_empty());
    }

    #[test]
    fn test_diff_lines_format() {
        let a = preset(json!({"param": 1}));
        let b = preset(json!({"param": 2}));
        assert_eq!(diff_lines(&diff_presets(&a, &b)), vec!["param: 1 -> 2"]);
    }

    #[test]
    fn test_non_object_is_invalid_preset() {
        let err = into_preset(json!([1, 2]), "list.json").unwrap_err();
        assert!(matches!(err, PresetError::InvalidPreset(_)));
    }

    #[test]
    fn test_load_missing_file_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let start = std::time::Instant::now();
        let err = load_preset(&dir.path().join("nope.json"), 5).unwrap_err();
        assert!(matches!(err, PresetError::FileSystem(_)));
        assert!(start.elapsed() < RETRY_PAUSE);
    }

    #[test]
    fn test_retry_io_gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<()> = retry_io("flaky", 2, || {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::Interrupted, "busy"))
        });
        assert_eq!(calls, 2);
        assert!(matches!(result, Err(PresetError::RetriesExhausted { attempts: 2, .. })));
    }

    #[test]
    fn test_retry_io_recovers() {
        let mut calls = 0;
        let value = retry_io("flaky", 3, || {
            calls += 1;
            if calls == 1 {
                Err(io::Error::new(io::ErrorKind::Interrupted, "busy"))
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_diff_directories() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::write(a.path().join("same.json"), r#"{"v": 1}"#).unwrap();
        std::fs::write(b.path().join("same.json"), r#"{"v": 1}"#).unwrap();
        std::fs::write(a.path().join("changed.json"), r#"{"v": 1}"#).unwrap();
        std::fs::write(b.path().join("changed.json"), r#"{"v": 2}"#).unwrap();
        std::fs::write(a.path().join("only_a.json"), r#"{}"#).unwrap();
        std::fs::write(a.path().join("broken.json"), "{").unwrap();
        std::fs::write(b.path().join("broken.json"), "{}").unwrap();

        let (report, summary) = diff_directories(a.path(), b.path(), 1).unwrap();
        assert_eq!(summary, BulkDiffSummary { compared: 3, changed: 1 });
        assert!(report.contains_key("changed.json"));
        assert!(!report.contains_key("broken.json"));
    }
}
