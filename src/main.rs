// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! presetvault: change tracking for avatar presets
//!
//! Change history, version snapshots, undo/redo and dependency analysis
//! over a directory of JSON presets.

use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use presetvault::backup::{backup_history, run_backup_loop, RetentionPolicy};
use presetvault::config::AppConfig;
use presetvault::deps::{self, report, DependencyGraph};
use presetvault::history::{format_entry, ChangeType};
use presetvault::preset::{diff_directories, diff_lines, diff_presets, into_preset, load_preset, Preset, PresetDiff};
use presetvault::undo::parse_state;
use presetvault::versions::{RestoreOutcome, SaveOutcome};
use presetvault::watcher::{PresetEvent, PresetWatcher};
use presetvault::{PresetError, Result, Workspace};

/// presetvault CLI - change tracking for avatar presets
#[derive(Parser, Debug)]
#[command(name = "presetvault")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Change history, snapshots, undo/redo and dependency analysis for presets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "presetvault.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Change history log operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Version snapshot operations
    Versions {
        #[command(subcommand)]
        action: VersionCommands,
    },

    /// Undo/redo stack operations
    Undo {
        #[command(subcommand)]
        action: UndoCommands,
    },

    /// Preset dependency analysis
    Deps {
        #[command(subcommand)]
        action: DepsCommands,
    },

    /// Diff two preset files
    Diff {
        a: PathBuf,
        b: PathBuf,
    },

    /// Diff every preset common to two directories
    DiffDirs {
        dir_a: PathBuf,
        dir_b: PathBuf,

        /// Write the JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Watch the preset directory and snapshot changed presets
    Watch {
        /// Do not save versions on change
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Initialize a new preset workspace
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List history entries
    List {
        /// Only entries for this preset
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Append a change entry
    Record {
        preset: String,

        /// edit, validate, apply, rollback, ...
        change_type: String,

        /// Preset before the change (JSON object)
        #[arg(long)]
        before: String,

        /// Preset after the change (JSON object)
        #[arg(long)]
        after: String,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        note: Option<String>,
    },

    /// Diff the preset between two points in time
    Diff {
        preset: String,

        /// YYYY-mm-dd HH:MM:SS
        #[arg(long)]
        from: String,

        /// YYYY-mm-dd HH:MM:SS
        #[arg(long)]
        to: String,
    },

    /// Export the preset as it was at a point in time
    Rollback {
        preset: String,

        /// YYYY-mm-dd HH:MM:SS
        #[arg(long)]
        at: String,

        /// Output file (default: rollback_<preset>.json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// Back up the history file with rotation
    Backup {
        /// Keep running and back up on the configured interval
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand, Debug)]
enum VersionCommands {
    /// Save a new version of a preset
    Save { preset_name: String },

    /// List versions of a preset
    List {
        preset_base: String,

        /// Show modification time and size
        #[arg(long)]
        detail: bool,
    },

    /// Diff two version files
    Diff { version_file1: String, version_file2: String },

    /// Restore a version over the live preset
    Restore { preset_base: String, version_file: String },

    /// Delete a version file
    Delete { version_file: String },

    /// Delete old versions
    Prune {
        preset_base: String,

        /// Keep at most this many versions
        #[arg(long)]
        keep: Option<usize>,

        /// Delete versions older than this many days
        #[arg(long)]
        max_days: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum UndoCommands {
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

    /// Show the whole stack
    Show,
}

#[derive(Subcommand, Debug)]
enum DepsCommands {
    /// Build the graph for the preset directory and report on it
    Analyze(DepsArgs),
}

#[derive(Args, Debug)]
struct DepsArgs {
    /// Dependency keys (default from config)
    #[arg(long, num_args = 1..)]
    keys: Vec<String>,

    /// Also infer custom parameter dependencies
    #[arg(long)]
    inferred: bool,

    /// Print the inverse dependency map
    #[arg(long)]
    inverse: bool,

    /// Detect dependency cycles
    #[arg(long)]
    cycles: bool,

    /// List presets without any dependency edge
    #[arg(long)]
    isolated: bool,

    /// Print aggregate statistics
    #[arg(long)]
    summary: bool,

    /// All presets depending on this one
    #[arg(long)]
    ancestors: Option<String>,

    /// All presets this one depends on
    #[arg(long)]
    descendants: Option<String>,

    /// Dependency map reachable from this preset
    #[arg(long)]
    subgraph: Option<String>,

    /// Save a Graphviz DOT file
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Save a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Save a Markdown report
    #[arg(long)]
    markdown: Option<PathBuf>,

    /// Save the JSON dependency map
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "presetvault.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)?;
    let ws = Workspace::new(config, Path::new("."));
    let json = cli.format == "json";

    match cli.command {
        Commands::History { action } => run_history_command(&ws, action, json).await,
        Commands::Versions { action } => run_versions_command(&ws, action, json),
        Commands::Undo { action } => run_undo_command(&ws, action),
        Commands::Deps { action: DepsCommands::Analyze(args) } => run_deps(&ws, args, json),
        Commands::Diff { a, b } => {
            let retries = ws.config.versions.retries;
            let diff = diff_presets(&load_preset(&a, retries)?, &load_preset(&b, retries)?);
            print_diff(&diff, json)
        }
        Commands::DiffDirs { dir_a, dir_b, report } => run_diff_dirs(&ws, &dir_a, &dir_b, report, json),
        Commands::Watch { no_snapshot } => run_watch(ws, no_snapshot).await,
        Commands::Config { action } => run_config_command(&ws.config, action, &cli.config),
        Commands::Init { dir, force } => run_init(dir, force),
    }
}

fn parse_preset_arg(s: &str, what: &str) -> Result<Preset> {
    let value: serde_json::Value = serde_json::from_str(s)?;
    into_preset(value, what)
}

fn print_diff(diff: &PresetDiff, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(diff)?);
    } else if diff.is_empty() {
        println!("No difference.");
    } else {
        for line in diff_lines(diff) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Completes when Ctrl+C or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

fn shutdown_channel() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}

/// Run history commands
async fn run_history_command(ws: &Workspace, action: HistoryCommands, json: bool) -> Result<()> {
    let history = ws.history()?;

    match action {
        HistoryCommands::List { preset } => {
            let entries = history.entries_for(preset.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("History ({} entries):", entries.len());
                for entry in &entries {
                    println!("  {}", format_entry(entry));
                }
            }
        }
        HistoryCommands::Record { preset, change_type, before, after, user, note } => {
            let before = parse_preset_arg(&before, "--before")?;
            let after = parse_preset_arg(&after, "--after")?;
            let entry = history.record_change(&preset, ChangeType::from(change_type), before, after, user, note)?;
            println!("Recorded: {}", format_entry(&entry));
        }
        HistoryCommands::Diff { preset, from, to } => {
            let diff = history.diff_by_time(&preset, &from, &to)?;
            if !json {
                println!("[{}] -> [{}]:", from, to);
            }
            print_diff(&diff, json)?;
        }
        HistoryCommands::Rollback { preset, at, out, user } => {
            let out = out.unwrap_or_else(|| PathBuf::from(format!("rollback_{}.json", preset)));
            let entry = history.rollback(&preset, &at, &out, user, None)?;
            println!("Rolled back {} to {}: {:?}", preset, at, out);
            println!("Logged: {}", format_entry(&entry));
        }
        HistoryCommands::Backup { watch } => {
            let policy = RetentionPolicy {
                max_backups: ws.config.backup.max_backups,
                max_days: ws.config.backup.max_days,
            };
            if watch {
                let shutdown = shutdown_channel();
                run_backup_loop(
                    ws.history_file.clone(),
                    ws.backup_dir.clone(),
                    policy,
                    Duration::from_secs(ws.config.backup.interval_secs.max(1)),
                    shutdown,
                )
                .await;
            } else {
                let path = backup_history(&ws.history_file, &ws.backup_dir, policy)?;
                println!("Backup: {:?}", path);
            }
        }
    }

    Ok(())
}

/// Run version snapshot commands
fn run_versions_command(ws: &Workspace, action: VersionCommands, json: bool) -> Result<()> {
    let store = ws.versions()?;

    match action {
        VersionCommands::Save { preset_name } => match store.save_version(&preset_name)? {
            SaveOutcome::Saved(path) => println!("Version saved: {:?}", path),
            SaveOutcome::AlreadyExists(path) => println!("Version already exists: {:?}", path),
            SaveOutcome::SourceMissing => eprintln!("{} does not exist in {:?}", preset_name, store.preset_dir()),
            SaveOutcome::Failed { attempts } => eprintln!("Could not save version after {} attempts.", attempts),
        },
        VersionCommands::List { preset_base, detail } => {
            let versions = store.list_versions(&preset_base, detail)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else if versions.is_empty() {
                println!("No versions found.");
            } else {
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
        }
        VersionCommands::Diff { version_file1, version_file2 } => {
            let diff = store.diff_versions(&version_file1, &version_file2)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else if diff.is_empty() {
                println!("No difference between versions.");
            } else {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            }
        }
        VersionCommands::Restore { preset_base, version_file } => {
            match store.restore_version(&preset_base, &version_file)? {
                RestoreOutcome::Restored(_) => println!("Restored {} from {}", preset_base, version_file),
                RestoreOutcome::Failed { attempts } => {
                    eprintln!("Could not restore version after {} attempts.", attempts)
                }
            }
        }
        VersionCommands::Delete { version_file } => {
            if store.delete_version(&version_file) {
                println!("Deleted version: {}", version_file);
            } else {
                eprintln!("Failed to delete {}", version_file);
            }
        }
        VersionCommands::Prune { preset_base, keep, max_days } => {
            let deleted = store.prune_versions(&preset_base, keep, max_days)?;
            println!("Deleted {} version(s)", deleted.len());
            for name in deleted {
                println!("  {}", name);
            }
        }
    }

    Ok(())
}

/// Run undo/redo stack commands
fn run_undo_command(ws: &Workspace, action: UndoCommands) -> Result<()> {
    let stack = ws.undo_stack();

    match action {
        UndoCommands::Add { state } => {
            // An error here makes main exit with status 1
            stack.add_state(parse_state(&state)?)?;
            println!("State added");
        }
        UndoCommands::Undo => {
            let state = stack.undo()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        UndoCommands::Redo => {
            let state = stack.redo()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        UndoCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&stack.snapshot()?)?);
        }
    }

    Ok(())
}

fn print_set<'a>(label: &str, items: impl IntoIterator<Item = &'a String>) {
    let items: Vec<&String> = items.into_iter().collect();
    println!("{} ({}):", label, items.len());
    for item in items {
        println!("  {}", item);
    }
}

fn build_graph(ws: &Workspace, keys: &[String], inferred: bool) -> Result<deps::DependencyAnalysis> {
    let cfg = &ws.config.dependencies;
    let keys = if keys.is_empty() { cfg.keys.as_slice() } else { keys };

    let started = Instant::now();
    let mut analysis = deps::analyze_directory(&ws.preset_dir, keys, cfg.load_retries)?;
    if inferred {
        let params = deps::infer_parameter_dependencies(&ws.preset_dir, &cfg.parameter_glob, &cfg.config_suffix)?;
        analysis.graph.merge(&params);
    }
    info!(
        "Analyzed {} presets in {:.2}s ({} skipped)",
        analysis.files.len(),
        started.elapsed().as_secs_f64(),
        analysis.skipped.len()
    );
    Ok(analysis)
}

/// Run dependency analysis
fn run_deps(ws: &Workspace, args: DepsArgs, json: bool) -> Result<()> {
    let analysis = build_graph(ws, &args.keys, args.inferred)?;
    let graph: &DependencyGraph = &analysis.graph;

    if json {
        let mut out = serde_json::Map::new();
        out.insert("dependencies".into(), serde_json::to_value(graph.dependency_map())?);
        if args.inverse {
            out.insert("inverse".into(), serde_json::to_value(graph.invert())?);
        }
        if args.cycles {
            out.insert("cycles".into(), serde_json::to_value(graph.detect_cycles())?);
        }
        if args.isolated {
            out.insert("isolated".into(), serde_json::to_value(graph.isolated(&analysis.files))?);
        }
        if args.summary {
            out.insert("summary".into(), serde_json::to_value(graph.summary())?);
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if args.inverse {
            println!("Inverse dependency map:");
            for (target, sources) in graph.invert() {
                println!("  {}: {:?}", target, sources);
            }
        }
        if args.cycles {
            let cycles = graph.detect_cycles();
            println!("Cycles ({}):", cycles.len());
            for cycle in cycles {
                println!("  {}", cycle.join(" -> "));
            }
        }
        if args.isolated {
            print_set("Isolated presets", &graph.isolated(&analysis.files));
        }
        if args.summary {
            let s = graph.summary();
            println!("Dependency summary:");
            println!("  total_presets: {}", s.total_presets);
            println!("  connected_presets: {}", s.connected_presets);
            println!("  max_dependencies: {}", s.max_dependencies);
            println!("  max_dependents: {}", s.max_dependents);
            if s.depth_is_approximate {
                println!("  max_depth: {} (approximate, graph has cycles)", s.max_depth);
            } else {
                println!("  max_depth: {}", s.max_depth);
            }
        }
    }

    if let Some(node) = &args.ancestors {
        match graph.ancestors(node) {
            Some(set) => print_set(&format!("Ancestors of {}", node), &set),
            None => println!("{} not found in dependency map.", node),
        }
    }
    if let Some(node) = &args.descendants {
        match graph.descendants(node) {
            Some(set) => print_set(&format!("Descendants of {}", node), &set),
            None => println!("{} not found in dependency map.", node),
        }
    }
    if let Some(node) = &args.subgraph {
        match graph.subgraph(node) {
            Some(sub) => {
                println!("Subgraph from {}:", node);
                for (source, targets) in sub {
                    println!("  {}: {:?}", source, targets);
                }
            }
            None => println!("{} not found in dependency map.", node),
        }
    }

    if let Some(path) = &args.dot {
        report::write_dot(graph, path)?;
        println!("DOT graph saved: {:?}", path);
    }
    if let Some(path) = &args.csv {
        report::write_csv(graph, path)?;
        println!("Dependency CSV saved: {:?}", path);
    }
    if let Some(path) = &args.markdown {
        report::write_markdown(graph, path)?;
        println!("Markdown report saved: {:?}", path);
    }
    if let Some(path) = &args.report {
        report::write_json_report(graph, path)?;
        println!("Dependency report saved: {:?}", path);
    }

    Ok(())
}

fn run_diff_dirs(ws: &Workspace, dir_a: &Path, dir_b: &Path, report: Option<PathBuf>, json: bool) -> Result<()> {
    let started = Instant::now();
    let (diffs, summary) = diff_directories(dir_a, dir_b, ws.config.versions.retries)?;

    if let Some(path) = &report {
        std::fs::write(path, serde_json::to_string_pretty(&diffs)?)?;
        println!("Diff report generated: {:?}", path);
    } else if json {
        println!("{}", serde_json::to_string_pretty(&diffs)?);
    } else {
        for (file, diff) in &diffs {
            println!("{}:", file);
            for line in diff_lines(diff) {
                println!("  {}", line);
            }
        }
    }
    println!(
        "Compared: {} files, Changed: {}, Time: {:.2}s",
        summary.compared,
        summary.changed,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Snapshot a changed preset and re-check the graph for cycles
fn handle_preset_change(ws: &Workspace, path: &Path, snapshot: bool) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| PresetError::NotFound(format!("{:?}", path)))?;
    info!("Change detected: {}", name);

    if snapshot {
        match ws.versions()?.save_version(&name)? {
            SaveOutcome::Saved(p) => info!("Snapshot saved: {:?}", p),
            SaveOutcome::AlreadyExists(_) => debug!("Snapshot for {} already taken this second", name),
            SaveOutcome::SourceMissing => debug!("{} vanished before snapshot", name),
            SaveOutcome::Failed { attempts } => warn!("Snapshot of {} failed after {} attempts", name, attempts),
        }
    }

    let analysis = build_graph(ws, &[], false)?;
    for cycle in analysis.graph.detect_cycles() {
        warn!("Dependency cycle: {}", cycle.join(" -> "));
    }
    Ok(())
}

/// Watch the preset directory until Ctrl+C
async fn run_watch(ws: Workspace, no_snapshot: bool) -> Result<()> {
    let snapshot = ws.config.watch.auto_snapshot && !no_snapshot;
    let debounce = Duration::from_millis(ws.config.watch.debounce_ms);
    let watcher = PresetWatcher::new(&ws.preset_dir)?;
    let shutdown_rx = shutdown_channel();
    let mut last_seen: HashMap<PathBuf, Instant> = HashMap::new();

    info!("Watching {:?}. Press Ctrl+C to stop.", watcher.dir());

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match watcher.next_event(Duration::from_millis(100)) {
            Some(PresetEvent::Changed(path)) => {
                let now = Instant::now();
                let recent = last_seen
                    .get(&path)
                    .is_some_and(|t| now.duration_since(*t) < debounce);
                if recent {
                    continue;
                }
                last_seen.insert(path.clone(), now);
                if let Err(e) = handle_preset_change(&ws, &path, snapshot) {
                    error!("Failed to process {:?}: {}", path, e);
                }
            }
            Some(PresetEvent::Removed(path)) => info!("Preset removed: {:?}", path),
            Some(PresetEvent::Error(e)) => warn!("Watch error: {}", e),
            None => {}
        }
    }

    info!("presetvault watch stopped.");
    Ok(())
}

/// Run config commands
fn run_config_command(config: &AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Preset dir: {}", config.paths.preset_dir);
            println!("  Version dir: {}", config.paths.version_dir);
            println!("  History file: {}", config.paths.history_file);
            println!("  Undo file: {} (max {} states)", config.paths.undo_file, config.undo.max_history);
            println!("  Dependency keys: {:?}", config.dependencies.keys);
        }
    }

    Ok(())
}

/// Initialize a new preset workspace
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("presetvault.json");

    if config_path.exists() && !force {
        return Err(PresetError::Config(
            "presetvault.json already exists. Use --force to overwrite".to_string()
        ));
    }

    let config = AppConfig::default();
    std::fs::create_dir_all(target.join(&config.paths.preset_dir))?;
    std::fs::create_dir_all(target.join(&config.paths.version_dir))?;
    config.save(&config_path)?;

    println!("presetvault initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - presetvault.json");
    println!("  - {}/", config.paths.preset_dir);
    println!("  - {}/", config.paths.version_dir);

    Ok(())
}
