// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rotating backups of the change history file

use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{PresetError, Result};

/// Rotation limits
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_backups: usize,
    pub max_days: u64,
}

const BACKUP_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<base>.<YYYYmmdd_HHMMSS>.bak` exactly
fn is_backup_of(file_name: &str, base: &str) -> bool {
    file_name
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".bak"))
        .is_some_and(|ts| NaiveDateTime::parse_from_str(ts, BACKUP_TIME_FORMAT).is_ok())
}

fn backups_of(history_file: &Path, backup_dir: &Path) -> Result<Vec<PathBuf>> {
    let base = history_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| PresetError::Config(format!("{:?} has no file name", history_file)))?;
    let mut backups: Vec<PathBuf> = fs::read_dir(backup_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| is_backup_of(&e.file_name().to_string_lossy(), &base))
        .map(|e| e.path())
        .collect();
    backups.sort();
    Ok(backups)
}

/// Copy the history file into `backup_dir` and prune old generations.
///
/// Backups are named `<file>.<YYYYmmdd_HHMMSS>.bak`. Pruning failures
/// are logged only.
pub fn backup_history(history_file: &Path, backup_dir: &Path, policy: RetentionPolicy) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;
    let name = history_file
        .file_name()
        .ok_or_else(|| PresetError::Config(format!("{:?} has no file name", history_file)))?
        .to_string_lossy();
    let ts = Local::now().format(BACKUP_TIME_FORMAT);
    let backup_path = backup_dir.join(format!("{}.{}.bak", name, ts));
    fs::copy(history_file, &backup_path)?;

    let backups = backups_of(history_file, backup_dir)?;
    let mut removed: Vec<&PathBuf> = Vec::new();
    if backups.len() > policy.max_backups {
        for old in &backups[..backups.len() - policy.max_backups] {
            match fs::remove_file(old) {
                Ok(()) => removed.push(old),
                Err(e) => warn!("Failed to remove old backup {:?}: {}", old, e),
            }
        }
    }

    let max_age = Duration::from_secs(policy.max_days * 24 * 60 * 60);
    let now = SystemTime::now();
    for backup in backups.iter().filter(|b| !removed.contains(b) && **b != backup_path) {
        let expired = fs::metadata(backup)
            .and_then(|m| m.modified())
            .map(|t| now.duration_since(t).unwrap_or_default() > max_age)
            .unwrap_or(false);
        if expired {
            if let Err(e) = fs::remove_file(backup) {
                warn!("Failed to remove expired backup {:?}: {}", backup, e);
            }
        }
    }

    info!("Backup: {:?}", backup_path);
    Ok(backup_path)
}

/// Back up every `interval` until `shutdown` flips to true
pub async fn run_backup_loop(
    history_file: PathBuf,
    backup_dir: PathBuf,
    policy: RetentionPolicy,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        "Backing up {:?} every {}s, keeping {} generations / {} days",
        history_file,
        interval.as_secs(),
        policy.max_backups,
        policy.max_days
    );
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = backup_history(&history_file, &backup_dir, policy) {
                    error!("Backup error: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Backup loop stopped");
}
