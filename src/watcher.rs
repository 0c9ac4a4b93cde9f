// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the preset directory

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::info;

use crate::Result;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetEvent {
    /// A preset was created or modified
    Changed(PathBuf),
    /// A preset was deleted
    Removed(PathBuf),
    /// Watcher error
    Error(String),
}

/// Watches one preset directory for `.json` changes
pub struct PresetWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
    event_rx: Receiver<notify::Result<Event>>,
}

impl PresetWatcher {
    /// Start watching `dir`, creating it if missing
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let mut watcher = RecommendedWatcher::new(tx, config)?;

        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            info!("Created preset directory: {:?}", dir);
        }
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", dir);

        Ok(Self {
            _watcher: watcher,
            dir: dir.to_path_buf(),
            event_rx: rx,
        })
    }

    /// Get the next preset event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<PresetEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => convert_event(event),
            Ok(Err(e)) => Some(PresetEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(PresetEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Convert a notify event, dropping anything that is not a preset file
pub fn convert_event(event: Event) -> Option<PresetEvent> {
    let path = event.paths.last()?.clone();
    if !is_preset_file(&path) {
        return None;
    }
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            if path.exists() {
                Some(PresetEvent::Changed(path))
            } else {
                Some(PresetEvent::Removed(path))
            }
        }
        EventKind::Remove(_) => Some(PresetEvent::Removed(path)),
        _ => None,
    }
}

/// Visible, non-temporary `.json` files
pub fn is_preset_file(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden and editor swap files
    if filename.starts_with('.') || filename.ends_with('~') {
        return false;
    }

    filename.ends_with(".json")
}
