// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Building dependency graphs from preset and parameter files

use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use super::{DependencyGraph, EdgeKind};
use crate::preset::{json_files, load_preset, Preset};
use crate::{PresetError, Result};

/// Graph plus the file set it was built from
#[derive(Debug, Clone, Default)]
pub struct DependencyAnalysis {
    pub graph: DependencyGraph,
    /// Every `*.json` file in the directory, parsed or not
    pub files: BTreeSet<String>,
    /// Files that could not be loaded
    pub skipped: Vec<String>,
}

/// `(key, target)` pairs for each string value under a dependency key
fn declared_dependencies(preset: &Preset, keys: &[String]) -> Vec<(String, String)> {
    let mut deps = Vec::new();
    for key in keys {
        match preset.get(key) {
            Some(Value::String(s)) => deps.push((key.clone(), s.clone())),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Value::String(s) = item {
                        deps.push((key.clone(), s.clone()));
                    }
                }
            }
            _ => {}
        }
    }
    deps
}

/// Preset names one preset depends on through the given keys
pub fn collect_dependencies(preset: &Preset, keys: &[String]) -> BTreeSet<String> {
    declared_dependencies(preset, keys)
        .into_iter()
        .map(|(_, target)| target)
        .collect()
}

/// Map a reference to a file name when `<target>.json` exists
fn resolve_target(target: &str, files: &BTreeSet<String>) -> String {
    if files.contains(target) {
        return target.to_string();
    }
    let with_ext = format!("{}.json", target);
    if files.contains(&with_ext) {
        with_ext
    } else {
        target.to_string()
    }
}

/// Scan every `*.json` preset in `dir` for declared dependencies.
///
/// Unreadable or malformed files are logged and skipped.
pub fn analyze_directory(dir: &Path, keys: &[String], retries: u32) -> Result<DependencyAnalysis> {
    let files = json_files(dir)?;
    let mut analysis = DependencyAnalysis {
        files: files.clone(),
        ..Default::default()
    };
    let total = files.len();

    for (idx, name) in files.iter().enumerate() {
        match load_preset(&dir.join(name), retries) {
            Ok(preset) => {
                for (key, target) in declared_dependencies(&preset, keys) {
                    let target = resolve_target(&target, &files);
                    analysis.graph.add_edge(name, &target, EdgeKind::Declared { key });
                }
            }
            Err(e) => {
                warn!("Failed to load {}: {}", name, e);
                analysis.skipped.push(name.clone());
            }
        }
        if (idx + 1) % 10 == 0 || idx + 1 == total {
            debug!("[{}/{}] analyzed", idx + 1, total);
        }
    }

    Ok(analysis)
}

struct ParameterDef {
    name: String,
    description: String,
    options: Vec<String>,
}

fn parameter_def(preset: &Preset, file_name: &str) -> ParameterDef {
    let name = preset
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(file_name)
        .to_string();
    let description = preset
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let is_select = preset.get("type").and_then(Value::as_str) == Some("select");
    let options = if is_select {
        preset
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| opts.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    ParameterDef { name, description, options }
}

/// Infer edges between custom parameter definitions.
///
/// A parameter depends on another when the other's name appears inside
/// its `description`, or inside one of its `options` if it is
/// `select`-typed. These edges are substring guesses and are marked
/// [`EdgeKind::Inferred`]. Files ending in `config_suffix` contribute
/// their `{"dependencies": {"A": ["B"]}}` maps as config edges.
pub fn infer_parameter_dependencies(
    dir: &Path,
    pattern: &str,
    config_suffix: &str,
) -> Result<DependencyGraph> {
    let full_pattern = dir.join(pattern).to_string_lossy().to_string();
    let paths = glob::glob(&full_pattern)
        .map_err(|e| PresetError::Config(format!("Invalid parameter pattern {}: {}", pattern, e)))?;

    let mut params: Vec<ParameterDef> = Vec::new();
    for path in paths.filter_map(|p| p.ok()) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match load_preset(&path, 1) {
            Ok(preset) => params.push(parameter_def(&preset, &file_name)),
            Err(e) => warn!("Skipping parameter definition {}: {}", file_name, e),
        }
    }
    params.sort_by(|a, b| a.name.cmp(&b.name));

    let mut graph = DependencyGraph::new();
    for param in &params {
        for other in &params {
            if other.name == param.name || other.name.is_empty() {
                continue;
            }
            if param.description.contains(&other.name) {
                graph.add_edge(&param.name, &other.name, EdgeKind::Inferred { field: "description".into() });
            }
            if param.options.iter().any(|opt| opt.contains(&other.name)) {
                graph.add_edge(&param.name, &other.name, EdgeKind::Inferred { field: "options".into() });
            }
        }
    }

    for file_name in json_files(dir)? {
        if !file_name.ends_with(config_suffix) {
            continue;
        }
        let config = match load_preset(&dir.join(&file_name), 1) {
            Ok(config) => config,
            Err(e) => {
                warn!("Skipping config {}: {}", file_name, e);
                continue;
            }
        };
        if let Some(Value::Object(deps)) = config.get("dependencies") {
            for (source, targets) in deps {
                let targets = match targets {
                    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                    Value::String(s) => vec![s.as_str()],
                    _ => Vec::new(),
                };
                for target in targets {
                    graph.add_edge(source, target, EdgeKind::Config { file: file_name.clone() });
                }
            }
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn keys() -> Vec<String> {
        vec!["base_preset".into(), "inherits".into(), "reference".into()]
    }

    #[test]
    fn test_collect_dependencies() {
        let preset = crate::preset::into_preset(
            json!({"base_preset": "base", "inherits": ["a", 3, "b"], "reference": {"no": 1}}),
            "t",
        )
        .unwrap();
        let deps = collect_dependencies(&preset, &keys());
        let expected: BTreeSet<String> = ["a", "b", "base"].iter().map(|s| s.to_string()).collect();
        assert_eq!(deps, expected);
    }

    #[test]
    fn test_analyze_directory_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A.json"), r#"{"base_preset": "B.json"}"#).unwrap();
        fs::write(dir.path().join("B.json"), r#"{"inherits": "C"}"#).unwrap();
        fs::write(dir.path().join("C.json"), r#"{}"#).unwrap();
        fs::write(dir.path().join("D.json"), r#"{}"#).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let analysis = analyze_directory(dir.path(), &keys(), 1).unwrap();
        assert_eq!(analysis.files.len(), 5);
        assert_eq!(analysis.skipped, vec!["broken.json"]);
        assert_eq!(analysis.graph.descendants("A.json").unwrap().len(), 2);
        assert!(analysis.graph.contains("C.json"));

        let isolated = analysis.graph.isolated(&analysis.files);
        let expected: BTreeSet<String> = ["D.json", "broken.json"].iter().map(|s| s.to_string()).collect();
        assert_eq!(isolated, expected);
    }

    #[test]
    fn test_inferred_parameter_edges() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("custom_parameter_eye.json"),
            r#"{"name": "eye_color", "type": "string", "description": "follows hair_color"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("custom_parameter_hair.json"),
            r#"{"name": "hair_color", "type": "select", "description": "", "options": ["match skin_tone", "black"]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("custom_parameter_skin.json"),
            r#"{"name": "skin_tone", "type": "string", "options": ["hair_color"]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("main_avatar_config.json"),
            r#"{"dependencies": {"outfit": ["skin_tone"]}}"#,
        )
        .unwrap();

        let graph = infer_parameter_dependencies(dir.path(), "custom_parameter_*.json", "avatar_config.json").unwrap();
        let edges: Vec<(String, String, String)> = graph
            .edges()
            .map(|(s, t, k)| (s.to_string(), t.to_string(), k.to_string()))
            .collect();

        assert!(edges.contains(&("eye_color".into(), "hair_color".into(), "description (inferred)".into())));
        assert!(edges.contains(&("hair_color".into(), "skin_tone".into(), "options (inferred)".into())));
        assert!(edges.contains(&("outfit".into(), "skin_tone".into(), "main_avatar_config.json (config)".into())));
        // options of a non-select parameter are not scanned
        assert!(graph.descendants("skin_tone").map_or(true, |d| d.is_empty()));
        assert_eq!(graph.without_inferred().edge_count(), 1);
    }
}
