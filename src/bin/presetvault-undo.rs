// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! presetvault Undo Utility
//!
//! Drives a persisted undo/redo stack from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use presetvault::undo::{parse_state, UndoRedoStack};

#[derive(Parser, Debug)]
#[command(name = "presetvault-undo")]
#[command(version = "1.0.0")]
#[command(about = "Undo/redo manager for preset edits")]
struct Args {
    /// Path to the undo history file
    history_file: PathBuf,

    /// Maximum number of states kept
    #[arg(long, default_value = "20")]
    max_history: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push a new state
    Add {
        /// State as JSON
        #[arg(long)]
        state: String,
    },
    /// Step back one state
    Undo,
    /// Step forward one state
    Redo,
}

/// Parse and push one state; malformed JSON is rejected before touching the file
fn add(stack: &UndoRedoStack, state: &str) -> presetvault::Result<()> {
    stack.add_state(parse_state(state)?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stack = UndoRedoStack::open(args.history_file.clone(), args.max_history);

    match args.command {
        Command::Add { state } => {
            add(&stack, &state).with_context(|| format!("adding state to {:?}", args.history_file))?;
            println!("State added");
        }
        Command::Undo => {
            println!("{}", serde_json::to_string_pretty(&stack.undo()?)?);
        }
        Command::Redo => {
            println!("{}", serde_json::to_string_pretty(&stack.redo()?)?);
        }
    }

    Ok(())
}
