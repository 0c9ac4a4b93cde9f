// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! presetvault: change tracking for avatar presets
//!
//! An append-only change history, timestamped version snapshots, a
//! crash-safe undo/redo stack and a dependency graph analyzer, all working
//! over plain JSON preset files on disk.

pub mod backup;
pub mod config;
pub mod deps;
pub mod error;
pub mod history;
pub mod preset;
pub mod undo;
pub mod versions;
pub mod watcher;
pub mod workspace;

pub use config::AppConfig;
pub use error::{PresetError, Result};
pub use workspace::Workspace;
