// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Explicit context object owning every path the components work on

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::history::ChangeHistory;
use crate::undo::UndoRedoStack;
use crate::versions::VersionStore;
use crate::Result;

/// Resolved locations plus the config they came from.
///
/// Relative paths in the config are resolved against `root`.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: AppConfig,
    pub preset_dir: PathBuf,
    pub version_dir: PathBuf,
    pub history_file: PathBuf,
    pub undo_file: PathBuf,
    pub backup_dir: PathBuf,
}

impl Workspace {
    pub fn new(config: AppConfig, root: &Path) -> Self {
        let resolve = |p: &str| {
            let p = PathBuf::from(p);
            if p.is_absolute() { p } else { root.join(p) }
        };
        Self {
            preset_dir: resolve(&config.paths.preset_dir),
            version_dir: resolve(&config.paths.version_dir),
            history_file: resolve(&config.paths.history_file),
            undo_file: resolve(&config.paths.undo_file),
            backup_dir: resolve(&config.paths.backup_dir),
            config,
        }
    }

    pub fn history(&self) -> Result<ChangeHistory> {
        ChangeHistory::new(self.history_file.clone())
    }

    pub fn versions(&self) -> Result<VersionStore> {
        VersionStore::new(
            self.preset_dir.clone(),
            self.version_dir.clone(),
            self.config.versions.retries,
        )
    }

    pub fn undo_stack(&self) -> UndoRedoStack {
        UndoRedoStack::open(self.undo_file.clone(), self.config.undo.max_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let ws = Workspace::new(AppConfig::default(), Path::new("/srv/avatars"));
        assert_eq!(ws.history_file, PathBuf::from("/srv/avatars/preset_change_history.jsonl"));
        assert_eq!(ws.preset_dir, PathBuf::from("/srv/avatars/./presets"));
    }

    #[test]
    fn test_absolute_paths_kept() {
        let mut config = AppConfig::default();
        config.paths.undo_file = "/var/lib/undo.json".to_string();
        let ws = Workspace::new(config, Path::new("/srv"));
        assert_eq!(ws.undo_file, PathBuf::from("/var/lib/undo.json"));
    }
}
