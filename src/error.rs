// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for presetvault

use thiserror::Error;

/// Result type alias for presetvault operations
pub type Result<T> = std::result::Result<T, PresetError>;

/// presetvault error types
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("State must be valid JSON: {0}")]
    InvalidState(String),

    #[error("{op} failed after {attempts} attempt(s)")]
    RetriesExhausted { op: String, attempts: u32 },

    #[error("Undo history lock poisoned")]
    LockPoisoned,
}
