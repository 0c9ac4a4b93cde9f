// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Timestamped full-file snapshots of presets

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::preset::{diff_presets, load_preset, retry_io, PresetDiff};
use crate::{PresetError, Result};

/// Timestamp suffix format; sorts lexicographically in time order
pub const VERSION_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Result of a snapshot attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// A snapshot with the same second-resolution name exists; nothing written
    AlreadyExists(PathBuf),
    SourceMissing,
    Failed { attempts: u32 },
}

/// Result of restoring a snapshot over the live preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(PathBuf),
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDetails {
    pub modified: DateTime<Local>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub file_name: String,
    /// Filled only for detailed listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<VersionDetails>,
}

/// Preset name without a trailing `.json`
pub fn preset_base(preset_name: &str) -> &str {
    preset_name.strip_suffix(".json").unwrap_or(preset_name)
}

fn preset_file_name(preset_name: &str) -> String {
    format!("{}.json", preset_base(preset_name))
}

/// `<base>_v<YYYYMMDD_HHMMSS>.json`
pub fn version_name(preset_name: &str, at: &DateTime<Local>) -> String {
    format!("{}_v{}.json", preset_base(preset_name), at.format(VERSION_TIME_FORMAT))
}

/// Timestamp embedded in a snapshot name, if it has one
pub fn version_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name.strip_suffix(".json")?;
    let (_, ts) = stem.rsplit_once("_v")?;
    NaiveDateTime::parse_from_str(ts, VERSION_TIME_FORMAT).ok()
}

/// `<prefix><YYYYMMDD_HHMMSS>.json` and nothing else, so `hat_v` never
/// matches snapshots of `hat_vintage`
fn is_version_of(file_name: &str, prefix: &str) -> bool {
    file_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(".json"))
        .is_some_and(|ts| NaiveDateTime::parse_from_str(ts, VERSION_TIME_FORMAT).is_ok())
}

/// Copy into an already-reserved destination
fn copy_into(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new().write(true).truncate(true).open(dst)?;
    let n = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(n)
}

/// Snapshot store for one preset directory
pub struct VersionStore {
    preset_dir: PathBuf,
    version_dir: PathBuf,
    retries: u32,
}

impl VersionStore {
    /// Create a store, making the version directory if needed
    pub fn new(preset_dir: PathBuf, version_dir: PathBuf, retries: u32) -> Result<Self> {
        fs::create_dir_all(&version_dir)?;
        Ok(Self { preset_dir, version_dir, retries: retries.max(1) })
    }

    /// Snapshot the live preset with the current local time
    pub fn save_version(&self, preset_name: &str) -> Result<SaveOutcome> {
        self.save_version_at(preset_name, &Local::now())
    }

    /// Snapshot the live preset under the name for `at`.
    ///
    /// The destination is reserved with `create_new`, so a same-second
    /// collision never overwrites an existing snapshot.
    pub fn save_version_at(&self, preset_name: &str, at: &DateTime<Local>) -> Result<SaveOutcome> {
        let src = self.preset_dir.join(preset_file_name(preset_name));
        if !src.is_file() {
            error!("{} does not exist in {:?}", preset_name, self.preset_dir);
            return Ok(SaveOutcome::SourceMissing);
        }

        let dst = self.version_dir.join(version_name(preset_name, at));
        match OpenOptions::new().write(true).create_new(true).open(&dst) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Version already exists: {:?}", dst);
                return Ok(SaveOutcome::AlreadyExists(dst));
            }
            Err(e) => return Err(e.into()),
        }

        let op = format!("Saving version {:?}", dst);
        match retry_io(&op, self.retries, || copy_into(&src, &dst)) {
            Ok(_) => {
                info!("Version saved: {:?}", dst);
                Ok(SaveOutcome::Saved(dst))
            }
            Err(e) => {
                error!("Could not save version after {} attempt(s): {}", self.retries, e);
                if let Err(e) = fs::remove_file(&dst) {
                    warn!("Failed to remove partial version {:?}: {}", dst, e);
                }
                Ok(SaveOutcome::Failed { attempts: self.retries })
            }
        }
    }

    /// Snapshots of one preset, oldest first
    pub fn list_versions(&self, preset_base_name: &str, detail: bool) -> Result<Vec<VersionInfo>> {
        let prefix = format!("{}_v", preset_base(preset_base_name));
        let mut names: Vec<String> = fs::read_dir(&self.version_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| is_version_of(n, &prefix))
            .collect();
        names.sort();

        names
            .into_iter()
            .map(|file_name| -> Result<VersionInfo> {
                let details = if detail {
                    let meta = fs::metadata(self.version_dir.join(&file_name))?;
                    Some(VersionDetails {
                        modified: DateTime::<Local>::from(meta.modified()?),
                        size: meta.len(),
                    })
                } else {
                    None
                };
                Ok(VersionInfo { file_name, details })
            })
            .collect()
    }

    /// Copy a snapshot back over the live preset
    pub fn restore_version(&self, preset_base_name: &str, version_file: &str) -> Result<RestoreOutcome> {
        let src = self.version_dir.join(version_file);
        if !src.is_file() {
            error!("Version file not found: {:?}", src);
            return Err(PresetError::NotFound(format!("version file {}", src.display())));
        }
        let dst = self.preset_dir.join(preset_file_name(preset_base_name));

        let op = format!("Restoring {}", version_file);
        match retry_io(&op, self.retries, || fs::copy(&src, &dst)) {
            Ok(_) => {
                info!("Restored {} from {}", preset_base_name, version_file);
                Ok(RestoreOutcome::Restored(dst))
            }
            Err(e) => {
                error!("Could not restore version after {} attempt(s): {}", self.retries, e);
                Ok(RestoreOutcome::Failed { attempts: self.retries })
            }
        }
    }

    /// Remove one snapshot; failures are logged and reported as `false`
    pub fn delete_version(&self, version_file: &str) -> bool {
        match fs::remove_file(self.version_dir.join(version_file)) {
            Ok(()) => {
                info!("Deleted version: {}", version_file);
                true
            }
            Err(e) => {
                error!("Failed to delete {}: {}", version_file, e);
                false
            }
        }
    }

    /// Key-level diff of two snapshots
    pub fn diff_versions(&self, version_file1: &str, version_file2: &str) -> Result<PresetDiff> {
        let v1 = load_preset(&self.version_dir.join(version_file1), self.retries)?;
        let v2 = load_preset(&self.version_dir.join(version_file2), self.retries)?;
        Ok(diff_presets(&v1, &v2))
    }

    /// Apply retention: keep at most `max_count` newest, drop older than `max_age_days`.
    ///
    /// Returns the names actually deleted.
    pub fn prune_versions(
        &self,
        preset_base_name: &str,
        max_count: Option<usize>,
        max_age_days: Option<u64>,
    ) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .list_versions(preset_base_name, false)?
            .into_iter()
            .map(|v| v.file_name)
            .collect();

        let mut doomed: Vec<String> = Vec::new();
        if let Some(max) = max_count {
            if names.len() > max {
                doomed.extend(names[..names.len() - max].iter().cloned());
            }
        }
        if let Some(days) = max_age_days {
            let cutoff = Local::now().naive_local() - chrono::Duration::days(days as i64);
            for name in &names {
                let expired = version_timestamp(name).is_some_and(|ts| ts < cutoff);
                if expired && !doomed.contains(name) {
                    doomed.push(name.clone());
                }
            }
        }

        Ok(doomed.into_iter().filter(|n| self.delete_version(n)).collect())
    }

    pub fn version_dir(&self) -> &Path {
        &self.version_dir
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }
}
