// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded undo/redo stack persisted to disk after every change

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::{PresetError, Result};

/// On-disk form: `{"history": [...], "index": n}`, index `-1` when empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoSnapshot {
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default = "empty_index")]
    pub index: i64,
}

fn empty_index() -> i64 { -1 }

impl Default for UndoSnapshot {
    fn default() -> Self {
        Self { history: Vec::new(), index: -1 }
    }
}

impl UndoSnapshot {
    /// Restore `0 <= index < len` (or `-1` when empty) on loaded data
    fn normalized(mut self) -> Self {
        if self.history.is_empty() {
            self.index = -1;
        } else if self.index < 0 || self.index as usize >= self.history.len() {
            warn!("Undo index {} out of range for {} states, using latest", self.index, self.history.len());
            self.index = self.history.len() as i64 - 1;
        }
        self
    }

    pub fn current(&self) -> Option<&Value> {
        if self.index < 0 {
            return None;
        }
        self.history.get(self.index as usize)
    }
}

/// Parse a command-line state argument
pub fn parse_state(input: &str) -> Result<Value> {
    serde_json::from_str(input).map_err(|e| PresetError::InvalidState(e.to_string()))
}

/// Path of the previous-generation sidecar for a history file
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn read_snapshot(path: &Path) -> Result<UndoSnapshot> {
    let content = fs::read_to_string(path)?;
    let snapshot: UndoSnapshot = serde_json::from_str(&content)?;
    Ok(snapshot.normalized())
}

/// Undo/redo manager for one editable entity (thread-safe)
pub struct UndoRedoStack {
    path: PathBuf,
    backup_path: PathBuf,
    max_history: usize,
    state: Mutex<UndoSnapshot>,
}

impl UndoRedoStack {
    /// Open a stack, recovering from the `.bak` sidecar if the primary is corrupt.
    ///
    /// Never fails: unusable files leave an empty history.
    pub fn open(path: PathBuf, max_history: usize) -> Self {
        let backup_path = backup_path(&path);
        let state = Self::load(&path, &backup_path);
        Self {
            path,
            backup_path,
            max_history: max_history.max(1),
            state: Mutex::new(state),
        }
    }

    fn load(path: &Path, backup: &Path) -> UndoSnapshot {
        if !path.exists() {
            return UndoSnapshot::default();
        }
        match read_snapshot(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load undo history {:?}: {}. Trying backup...", path, e);
                if !backup.exists() {
                    return UndoSnapshot::default();
                }
                match read_snapshot(backup) {
                    Ok(snapshot) => {
                        info!("Undo history recovered from backup {:?}", backup);
                        snapshot
                    }
                    Err(e) => {
                        error!("Failed to recover undo history from backup: {}", e);
                        UndoSnapshot::default()
                    }
                }
            }
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, UndoSnapshot>> {
        self.state.lock().map_err(|_| PresetError::LockPoisoned)
    }

    /// Copy the current file to `.bak`, then overwrite and fsync the primary
    fn persist(&self, state: &UndoSnapshot) -> Result<()> {
        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, &self.backup_path) {
                warn!("Undo history backup failed: {}", e);
            }
        } else if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(state)?;
        let mut file = File::create(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Push a new state, discarding any redo branch and the oldest overflow
    pub fn add_state(&self, value: Value) -> Result<()> {
        let mut state = self.lock_state()?;
        let keep = (state.index + 1).max(0) as usize;
        state.history.truncate(keep);
        state.history.push(value);
        if state.history.len() > self.max_history {
            let overflow = state.history.len() - self.max_history;
            state.history.drain(..overflow);
        }
        state.index = state.history.len() as i64 - 1;
        self.persist(&state)
    }

    /// Step back; `None` when already at the oldest state
    pub fn undo(&self) -> Result<Option<Value>> {
        let mut state = self.lock_state()?;
        if state.index > 0 {
            state.index -= 1;
            self.persist(&state)?;
            Ok(state.current().cloned())
        } else {
            Ok(None)
        }
    }

    /// Step forward; `None` when already at the newest state
    pub fn redo(&self) -> Result<Option<Value>> {
        let mut state = self.lock_state()?;
        if state.index < state.history.len() as i64 - 1 {
            state.index += 1;
            self.persist(&state)?;
            Ok(state.current().cloned())
        } else {
            Ok(None)
        }
    }

    pub fn current(&self) -> Result<Option<Value>> {
        Ok(self.lock_state()?.current().cloned())
    }

    pub fn can_undo(&self) -> Result<bool> {
        Ok(self.lock_state()?.index > 0)
    }

    pub fn can_redo(&self) -> Result<bool> {
        let state = self.lock_state()?;
        Ok(state.index < state.history.len() as i64 - 1)
    }

    /// Copy of the full history and index
    pub fn snapshot(&self) -> Result<UndoSnapshot> {
        Ok(self.lock_state()?.clone())
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
