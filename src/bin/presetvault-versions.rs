// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! presetvault Version Manager
//!
//! Standalone snapshot tool working directly on a preset and a version
//! directory, without a workspace config.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use presetvault::versions::{RestoreOutcome, SaveOutcome, VersionStore};

#[derive(Parser, Debug)]
#[command(name = "presetvault-versions")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Save, list, diff and restore preset versions")]
struct Args {
    /// Directory holding the live presets
    preset_dir: PathBuf,

    /// Directory holding version snapshots
    version_dir: PathBuf,

    /// Attempts for copy operations
    #[arg(long, default_value = "2")]
    retries: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a new version of a preset
    Save { preset_name: String },
    /// List versions of a preset
    List {
        preset_base: String,
        #[arg(long)]
        detail: bool,
    },
    /// Diff two version files
    Diff { version_file1: String, version_file2: String },
    /// Restore a version over the live preset
    Restore { preset_base: String, version_file: String },
    /// Delete a version file
    Delete { version_file: String },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let store = VersionStore::new(args.preset_dir.clone(), args.version_dir.clone(), args.retries)
        .with_context(|| format!("opening version directory {:?}", args.version_dir))?;

    match args.command {
        Command::Save { preset_name } => match store.save_version(&preset_name)? {
            SaveOutcome::Saved(path) => println!("Version saved: {:?}", path),
            SaveOutcome::AlreadyExists(path) => println!("Version already exists: {:?}", path),
            SaveOutcome::SourceMissing => println!("{} does not exist.", preset_name),
            SaveOutcome::Failed { attempts } => println!("Could not save version after {} attempts.", attempts),
        },
        Command::List { preset_base, detail } => {
            let versions = store
                .list_versions(&preset_base, detail)
                .with_context(|| format!("listing versions of {}", preset_base))?;
            if versions.is_empty() {
                println!("No versions found.");
            }
            for v in versions {
                match v.details {
                    Some(d) => println!(
                        "{}\t{}\t{} bytes",
                        v.file_name,
                        d.modified.format("%Y-%m-%d %H:%M:%S"),
                        d.size
                    ),
                    None => println!("{}", v.file_name),
                }
            }
        }
        Command::Diff { version_file1, version_file2 } => {
            let diff = store
                .diff_versions(&version_file1, &version_file2)
                .with_context(|| format!("comparing {} and {}", version_file1, version_file2))?;
            if diff.is_empty() {
                println!("No difference between versions.");
            } else {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            }
        }
        Command::Restore { preset_base, version_file } => {
            match store.restore_version(&preset_base, &version_file)? {
                RestoreOutcome::Restored(_) => println!("Restored {} from {}", preset_base, version_file),
                RestoreOutcome::Failed { attempts } => {
                    println!("Could not restore version after {} attempts.", attempts)
                }
            }
        }
        Command::Delete { version_file } => {
            if store.delete_version(&version_file) {
                println!("Deleted version: {}", version_file);
            } else {
                println!("Failed to delete {}", version_file);
            }
        }
    }

    Ok(())
}
