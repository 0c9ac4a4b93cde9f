// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! End-to-end flows across history, versions, dependencies and undo

use chrono::{Local, TimeZone};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

use presetvault::history::{create_entry, parse_target_time, ChangeType};
use presetvault::preset::{into_preset, load_preset, Preset};
use presetvault::versions::SaveOutcome;
use presetvault::{deps, AppConfig, PresetError, Workspace};

fn preset(value: serde_json::Value) -> Preset {
    into_preset(value, "test").unwrap()
}

fn workspace(dir: &TempDir) -> Workspace {
    let ws = Workspace::new(AppConfig::default(), dir.path());
    fs::create_dir_all(&ws.preset_dir).unwrap();
    ws
}

#[test]
fn test_history_rollback_flow() {
    let dir = TempDir::new().unwrap();
    let ws = workspace(&dir);
    let history = ws.history().unwrap();

    let times = ["2024-05-01 10:00:00", "2024-05-01 11:00:00", "2024-05-01 12:00:00"];
    let mut before = Preset::new();
    for (i, t) in times.iter().enumerate() {
        let after = preset(json!({"height": 150 + i, "hair": "black"}));
        let mut entry = create_entry("hero", ChangeType::Edit, before.clone(), after.clone(), None, None);
        entry.timestamp = parse_target_time(t).unwrap();
        history.append(&entry).unwrap();
        before = after;
    }

    let diff = history.diff_by_time("hero", "2024-05-01 10:00:05", "2024-05-01 11:59:00").unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff["height"].a, json!(150));
    assert_eq!(diff["height"].b, json!(152));

    let out = dir.path().join("rollback_hero.json");
    let entry = history
        .rollback("hero", "2024-05-01 10:10:00", &out, Some("alice".into()), None)
        .unwrap();
    assert_eq!(load_preset(&out, 1).unwrap(), preset(json!({"height": 150, "hair": "black"})));
    assert_eq!(entry.change_type, ChangeType::Rollback);
    assert_eq!(entry.before["height"], json!(152));

    let all = history.entries_for(Some("hero")).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.last().unwrap().user.as_deref(), Some("alice"));

    let missing = history.rollback("villain", "2024-05-01 10:00:00", &out, None, None);
    assert!(matches!(missing, Err(PresetError::NotFound(_))));
}

#[test]
fn test_version_snapshot_flow() {
    let dir = TempDir::new().unwrap();
    let ws = workspace(&dir);
    let store = ws.versions().unwrap();
    let live = ws.preset_dir.join("hat.json");

    fs::write(&live, r#"{"color": "red"}"#).unwrap();
    let t1 = Local.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let first = match store.save_version_at("hat.json", &t1).unwrap() {
        SaveOutcome::Saved(p) => p,
        other => panic!("unexpected {:?}", other),
    };
    assert!(matches!(store.save_version_at("hat", &t1).unwrap(), SaveOutcome::AlreadyExists(_)));

    fs::write(&live, r#"{"color": "blue", "size": 2}"#).unwrap();
    let t2 = Local.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
    store.save_version_at("hat", &t2).unwrap();

    let names: Vec<String> = store
        .list_versions("hat", false)
        .unwrap()
        .into_iter()
        .map(|v| v.file_name)
        .collect();
    assert_eq!(names, vec!["hat_v20240101_090000.json", "hat_v20240102_090000.json"]);

    let diff = store.diff_versions(&names[0], &names[1]).unwrap();
    assert_eq!(diff["size"].a, json!(null));
    assert_eq!(diff["color"].b, json!("blue"));

    store.restore_version("hat", &names[0]).unwrap();
    assert_eq!(fs::read(&live).unwrap(), fs::read(&first).unwrap());

    assert!(matches!(
        store.restore_version("hat", "hat_v19990101_000000.json"),
        Err(PresetError::NotFound(_))
    ));

    let pruned = store.prune_versions("hat", Some(1), None).unwrap();
    assert_eq!(pruned, vec!["hat_v20240101_090000.json"]);
}

#[test]
fn test_dependency_flow() {
    let dir = TempDir::new().unwrap();
    let ws = workspace(&dir);
    let p = &ws.preset_dir;
    fs::write(p.join("A.json"), r#"{"base_preset": "B"}"#).unwrap();
    fs::write(p.join("B.json"), r#"{"inherits": ["C"]}"#).unwrap();
    fs::write(p.join("C.json"), r#"{"reference": "A.json"}"#).unwrap();
    fs::write(p.join("lonely.json"), r#"{"name": "lonely"}"#).unwrap();

    let cfg = &ws.config.dependencies;
    let analysis = deps::analyze_directory(p, &cfg.keys, cfg.load_retries).unwrap();
    let graph = &analysis.graph;

    let cycles = graph.detect_cycles();
    assert_eq!(cycles, vec![vec!["A.json", "B.json", "C.json", "A.json"]]);

    let isolated: Vec<String> = graph.isolated(&analysis.files).into_iter().collect();
    assert_eq!(isolated, vec!["lonely.json"]);

    let ancestors = graph.ancestors("B.json").unwrap();
    assert!(ancestors.contains("A.json") && ancestors.contains("C.json"));

    let out = dir.path().join("deps.md");
    deps::report::write_markdown(graph, &out).unwrap();
    assert!(fs::read_to_string(out).unwrap().contains("Total dependencies: 3"));

    let summary = graph.summary();
    assert_eq!(summary.total_presets, 3);
    assert!(summary.depth_is_approximate);
}

#[test]
fn test_undo_stack_from_workspace() {
    let dir = TempDir::new().unwrap();
    let ws = workspace(&dir);
    {
        let stack = ws.undo_stack();
        stack.add_state(json!({"height": 1})).unwrap();
        stack.add_state(json!({"height": 2})).unwrap();
        assert_eq!(stack.undo().unwrap(), Some(json!({"height": 1})));
    }

    let reopened = ws.undo_stack();
    assert_eq!(reopened.current().unwrap(), Some(json!({"height": 1})));
    assert!(reopened.can_redo().unwrap());

    fs::write(&ws.undo_file, "not json").unwrap();
    let recovered = ws.undo_stack();
    assert!(recovered.current().unwrap().is_some());
}
