// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Append-only change history of preset edits (JSON Lines)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Split, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::preset::{diff_presets, write_preset, Preset, PresetDiff};
use crate::{PresetError, Result};

/// Format accepted for target times on the command line
pub const TARGET_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of change recorded in the history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeType {
    Edit,
    Validate,
    Apply,
    Rollback,
    Other(String),
}

impl From<String> for ChangeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "edit" => ChangeType::Edit,
            "validate" => ChangeType::Validate,
            "apply" => ChangeType::Apply,
            "rollback" => ChangeType::Rollback,
            _ => ChangeType::Other(s),
        }
    }
}

impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        ChangeType::from(s.to_string())
    }
}

impl From<ChangeType> for String {
    fn from(t: ChangeType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Edit => f.write_str("edit"),
            ChangeType::Validate => f.write_str("validate"),
            ChangeType::Apply => f.write_str("apply"),
            ChangeType::Rollback => f.write_str("rollback"),
            ChangeType::Other(s) => f.write_str(s),
        }
    }
}

/// A single preset change in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Unix seconds
    pub timestamp: f64,
    pub preset_name: String,
    pub change_type: ChangeType,
    pub before: Preset,
    pub after: Preset,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Current time as fractional unix seconds
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Create a new change entry stamped with the current time
pub fn create_entry(
    preset_name: &str,
    change_type: ChangeType,
    before: Preset,
    after: Preset,
    user: Option<String>,
    note: Option<String>,
) -> ChangeEntry {
    ChangeEntry {
        timestamp: now_timestamp(),
        preset_name: preset_name.to_string(),
        change_type,
        before,
        after,
        user,
        note,
    }
}

/// Parse a `YYYY-mm-dd HH:MM:SS` local time (or RFC 3339) into unix seconds
pub fn parse_target_time(s: &str) -> Result<f64> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TARGET_TIME_FORMAT) {
        let local = Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| PresetError::InvalidTimestamp(format!("{} does not exist in local time", s)))?;
        return Ok(local.timestamp_millis() as f64 / 1000.0);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
        .map_err(|_| PresetError::InvalidTimestamp(format!("{} (expected {})", s, TARGET_TIME_FORMAT)))
}

/// Entry whose timestamp is nearest to `target`; ties go to the earliest in file order
pub fn closest_entry(entries: &[ChangeEntry], target: f64) -> Option<&ChangeEntry> {
    let mut closest: Option<&ChangeEntry> = None;
    for entry in entries {
        let better = match closest {
            None => true,
            Some(c) => (entry.timestamp - target).abs() < (c.timestamp - target).abs(),
        };
        if better {
            closest = Some(entry);
        }
    }
    closest
}

/// Render one entry as `[YYYY-mm-dd HH:MM:SS] <preset> <type>: <note>`
pub fn format_entry(entry: &ChangeEntry) -> String {
    let ts = DateTime::from_timestamp_millis((entry.timestamp * 1000.0) as i64)
        .map(|dt| dt.with_timezone(&Local).format(TARGET_TIME_FORMAT).to_string())
        .unwrap_or_else(|| entry.timestamp.to_string());
    format!(
        "[{}] {} {}: {}",
        ts,
        entry.preset_name,
        entry.change_type,
        entry.note.as_deref().unwrap_or("-")
    )
}

/// Lazy, restartable scan over the history file
pub struct HistoryIter {
    lines: Option<Split<BufReader<File>>>,
    line_no: usize,
    preset_name: Option<String>,
}

impl Iterator for HistoryIter {
    type Item = Result<ChangeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let bytes = match lines.next()? {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(_) => {
                    return Some(Err(PresetError::InvalidPreset(format!(
                        "history line {} is not valid UTF-8",
                        self.line_no
                    ))))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let entry: ChangeEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            match &self.preset_name {
                Some(name) if &entry.preset_name != name => continue,
                _ => return Some(Ok(entry)),
            }
        }
    }
}

/// Change history manager backed by a JSON Lines file
pub struct ChangeHistory {
    path: PathBuf,
}

impl ChangeHistory {
    /// Create a history manager, making the parent directory if needed
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &ChangeEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Record a change and return the stored entry
    pub fn record_change(
        &self,
        preset_name: &str,
        change_type: ChangeType,
        before: Preset,
        after: Preset,
        user: Option<String>,
        note: Option<String>,
    ) -> Result<ChangeEntry> {
        let entry = create_entry(preset_name, change_type, before, after, user, note);
        self.append(&entry)?;
        Ok(entry)
    }

    /// Iterate entries in file order, optionally for one preset.
    ///
    /// Each call re-reads the file from the start. A missing file yields
    /// nothing; a malformed line yields an `Err` for that line only.
    pub fn iter_history(&self, preset_name: Option<&str>) -> Result<HistoryIter> {
        let lines = if self.path.exists() {
            Some(BufReader::new(File::open(&self.path)?).split(b'\n'))
        } else {
            None
        };
        Ok(HistoryIter {
            lines,
            line_no: 0,
            preset_name: preset_name.map(String::from),
        })
    }

    /// Collect entries, skipping malformed lines with a warning
    pub fn entries_for(&self, preset_name: Option<&str>) -> Result<Vec<ChangeEntry>> {
        let mut entries = Vec::new();
        for item in self.iter_history(preset_name)? {
            match item {
                Ok(entry) => entries.push(entry),
                Err(PresetError::Json(e)) => warn!("Failed to parse history entry: {}", e),
                Err(PresetError::InvalidPreset(msg)) => warn!("Skipping history entry: {}", msg),
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Entry for `preset_name` nearest to the given target time string
    pub fn find_closest(&self, preset_name: &str, target: &str) -> Result<ChangeEntry> {
        let target = parse_target_time(target)?;
        let entries = self.entries_for(Some(preset_name))?;
        closest_entry(&entries, target)
            .cloned()
            .ok_or_else(|| PresetError::NotFound(format!("no history for preset {}", preset_name)))
    }

    /// Diff the `after` snapshots of the entries nearest to two times
    pub fn diff_by_time(&self, preset_name: &str, from: &str, to: &str) -> Result<PresetDiff> {
        let e1 = self.find_closest(preset_name, from)?;
        let e2 = self.find_closest(preset_name, to)?;
        Ok(diff_presets(&e1.after, &e2.after))
    }

    /// Log a rollback to the snapshot nearest to `target`, then export it.
    ///
    /// The `rollback` entry is appended before `out_path` is written, so an
    /// export never exists without its log entry. Its `before` is the last
    /// known state.
    pub fn rollback(
        &self,
        preset_name: &str,
        target: &str,
        out_path: &Path,
        user: Option<String>,
        note: Option<String>,
    ) -> Result<ChangeEntry> {
        let entries = self.entries_for(Some(preset_name))?;
        let target_ts = parse_target_time(target)?;
        let restored = closest_entry(&entries, target_ts)
            .ok_or_else(|| PresetError::NotFound(format!("no history for preset {} near {}", preset_name, target)))?
            .after
            .clone();
        let before = entries.last().map(|e| e.after.clone()).unwrap_or_default();

        let note = note.unwrap_or_else(|| format!("rollback to {}", target));
        let entry = self.record_change(preset_name, ChangeType::Rollback, before, restored, user, Some(note))?;
        write_preset(out_path, &entry.after)?;
        Ok(entry)
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn preset(value: serde_json::Value) -> Preset {
        crate::preset::into_preset(value, "test").unwrap()
    }

    fn entry_at(name: &str, ts: f64, after: serde_json::Value) -> ChangeEntry {
        ChangeEntry {
            timestamp: ts,
            preset_name: name.to_string(),
            change_type: ChangeType::Edit,
            before: Preset::new(),
            after: preset(after),
            user: None,
            note: None,
        }
    }

    fn history(dir: &TempDir) -> ChangeHistory {
        ChangeHistory::new(dir.path().join("logs/history.jsonl")).unwrap()
    }

    #[test]
    fn test_record_and_iterate_in_order() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.record_change("A", ChangeType::Edit, preset(json!({"p": 1})), preset(json!({"p": 2})),
            Some("admin".into()), Some("param change".into())).unwrap();
        hist.record_change("A", ChangeType::Validate, preset(json!({"p": 2})), preset(json!({"p": 2})),
            Some("system".into()), None).unwrap();

        let entries = hist.entries_for(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].change_type, ChangeType::Edit);
        assert_eq!(entries[1].change_type, ChangeType::Validate);
        assert_eq!(entries[0].user.as_deref(), Some("admin"));
    }

    #[test]
    fn test_iter_filters_by_preset_and_restarts() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.append(&entry_at("A", 1.0, json!({}))).unwrap();
        hist.append(&entry_at("B", 2.0, json!({}))).unwrap();
        hist.append(&entry_at("A", 3.0, json!({}))).unwrap();

        let first: Vec<f64> = hist.iter_history(Some("A")).unwrap().map(|e| e.unwrap().timestamp).collect();
        let second: Vec<f64> = hist.iter_history(Some("A")).unwrap().map(|e| e.unwrap().timestamp).collect();
        assert_eq!(first, vec![1.0, 3.0]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        assert_eq!(hist.iter_history(None).unwrap().count(), 0);
    }

    #[test]
    fn test_blank_lines_tolerated_and_malformed_reported() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.append(&entry_at("A", 1.0, json!({}))).unwrap();
        let mut file = OpenOptions::new().append(true).open(hist.path()).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();
        drop(file);
        hist.append(&entry_at("A", 2.0, json!({}))).unwrap();

        let items: Vec<_> = hist.iter_history(None).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(items[1].is_err());
        assert_eq!(hist.entries_for(None).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.append(&entry_at("A", 1.0, json!({"n": 1}))).unwrap();
        let mut file = OpenOptions::new().append(true).open(hist.path()).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        drop(file);
        hist.append(&entry_at("A", 2.0, json!({"n": 2}))).unwrap();

        let items: Vec<_> = hist.iter_history(None).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Err(PresetError::InvalidPreset(_))));

        let entries = hist.entries_for(Some("A")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].after["n"], json!(2));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(entry_at("A", 1.5, json!({"x": 1}))).unwrap();
        assert_eq!(value["change_type"], "edit");
        assert_eq!(value["user"], serde_json::Value::Null);
        assert_eq!(value["after"], json!({"x": 1}));
    }

    #[test]
    fn test_unknown_change_type_preserved() {
        let t: ChangeType = serde_json::from_str("\"import\"").unwrap();
        assert_eq!(t, ChangeType::Other("import".into()));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"import\"");
    }

    #[test]
    fn test_closest_entry_ties_go_to_first() {
        let entries = vec![
            entry_at("A", 90.0, json!({"v": "first"})),
            entry_at("A", 110.0, json!({"v": "second"})),
            entry_at("A", 200.0, json!({"v": "third"})),
        ];
        assert_eq!(closest_entry(&entries, 100.0).unwrap().after["v"], "first");
        assert_eq!(closest_entry(&entries, 180.0).unwrap().after["v"], "third");
        assert!(closest_entry(&[], 1.0).is_none());
    }

    #[test]
    fn test_parse_target_time() {
        let a = parse_target_time("2024-01-01 12:00:00").unwrap();
        let b = parse_target_time("2024-01-01 12:00:30").unwrap();
        assert_eq!(b - a, 30.0);
        assert_eq!(parse_target_time("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200.0);
        assert!(matches!(parse_target_time("yesterday"), Err(PresetError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_find_closest_and_diff_by_time() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        let t = parse_target_time("2024-05-01 10:00:00").unwrap();
        hist.append(&entry_at("A", t, json!({"x": 1}))).unwrap();
        hist.append(&entry_at("B", t + 30.0, json!({"x": 99}))).unwrap();
        hist.append(&entry_at("A", t + 60.0, json!({"x": 2, "y": 3}))).unwrap();

        let found = hist.find_closest("A", "2024-05-01 10:00:50").unwrap();
        assert_eq!(found.after["x"], 2);

        let diff = hist.diff_by_time("A", "2024-05-01 10:00:00", "2024-05-01 10:01:00").unwrap();
        assert_eq!(
            serde_json::to_value(&diff).unwrap(),
            json!({"x": {"A": 1, "B": 2}, "y": {"A": null, "B": 3}})
        );
    }

    #[test]
    fn test_find_closest_unknown_preset_is_not_found() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.append(&entry_at("A", 1.0, json!({}))).unwrap();
        assert!(matches!(
            hist.find_closest("Z", "2024-01-01 00:00:00"),
            Err(PresetError::NotFound(_))
        ));
    }

    #[test]
    fn test_rollback_exports_and_logs() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        let t = parse_target_time("2024-05-01 10:00:00").unwrap();
        hist.append(&entry_at("A", t, json!({"x": 1}))).unwrap();
        hist.append(&entry_at("A", t + 3600.0, json!({"x": 5}))).unwrap();

        let out = dir.path().join("rollback_A.json");
        let logged = hist.rollback("A", "2024-05-01 10:05:00", &out, Some("admin".into()), None).unwrap();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, json!({"x": 1}));
        assert_eq!(logged.change_type, ChangeType::Rollback);
        assert_eq!(logged.before, preset(json!({"x": 5})));
        assert_eq!(logged.after, preset(json!({"x": 1})));

        let entries = hist.entries_for(Some("A")).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], logged);
    }

    #[test]
    fn test_rollback_logged_before_export() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        hist.append(&entry_at("A", 1.0, json!({"x": 1}))).unwrap();

        let out = dir.path().join("missing_dir").join("rollback_A.json");
        assert!(matches!(
            hist.rollback("A", "2024-05-01 10:05:00", &out, None, None),
            Err(PresetError::FileSystem(_))
        ));
        assert!(!out.exists());

        let entries = hist.entries_for(Some("A")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].change_type, ChangeType::Rollback);
    }

    #[test]
    fn test_rollback_without_history_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let hist = history(&dir);
        let out = dir.path().join("out.json");
        assert!(matches!(
            hist.rollback("A", "2024-05-01 10:05:00", &out, None, None),
            Err(PresetError::NotFound(_))
        ));
        assert!(!out.exists());
        assert!(!hist.path().exists());
    }

    #[test]
    fn test_format_entry() {
        let mut entry = entry_at("A", 0.0, json!({}));
        entry.note = Some("tweak".into());
        let line = format_entry(&entry);
        assert!(line.ends_with("A edit: tweak"));
        assert!(line.starts_with('['));
    }
}
