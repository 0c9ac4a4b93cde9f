// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Dependency reports: JSON map, Graphviz DOT, CSV and Markdown

use minijinja::{context, Environment};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

use super::DependencyGraph;
use crate::Result;

const MARKDOWN_TEMPLATE: &str = r#"# Preset Dependency Report

{% if edges %}| From | To | Source |
|------|----|--------|
{% for e in edges %}| {{ e.from }} | {{ e.to }} | {{ e.source }} |
{% endfor %}
Total dependencies: {{ total }}
{% else %}No dependencies detected.
{% endif %}"#;

#[derive(Serialize)]
struct EdgeRow<'a> {
    from: &'a str,
    to: &'a str,
    source: String,
    #[serde(skip)]
    inferred: bool,
}

fn rows(graph: &DependencyGraph) -> Vec<EdgeRow<'_>> {
    let mut rows: Vec<EdgeRow<'_>> = graph
        .edges()
        .map(|(from, to, kind)| EdgeRow {
            from,
            to,
            source: kind.to_string(),
            inferred: kind.is_inferred(),
        })
        .collect();
    rows.sort_by(|a, b| (a.from, a.to, &a.source).cmp(&(b.from, b.to, &b.source)));
    rows
}

/// Write the `source -> [targets]` map as pretty JSON
pub fn write_json_report(graph: &DependencyGraph, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(&graph.dependency_map())?;
    std::fs::write(path, content)?;
    Ok(())
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Graphviz source; inferred edges are dashed
pub fn to_dot(graph: &DependencyGraph) -> String {
    let mut out = String::from("digraph dependencies {\n");
    for row in rows(graph) {
        let style = if row.inferred { " [style=dashed]" } else { "" };
        let _ = writeln!(out, "  \"{}\" -> \"{}\"{};", dot_escape(row.from), dot_escape(row.to), style);
    }
    out.push_str("}\n");
    out
}

pub fn write_dot(graph: &DependencyGraph, path: &Path) -> Result<()> {
    std::fs::write(path, to_dot(graph))?;
    Ok(())
}

/// `preset,depends_on,source` rows
pub fn write_csv(graph: &DependencyGraph, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["preset", "depends_on", "source"])?;
    for row in rows(graph) {
        writer.write_record([row.from, row.to, row.source.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn render_markdown(graph: &DependencyGraph) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("dependencies.md", MARKDOWN_TEMPLATE)?;
    let template = env.get_template("dependencies.md")?;
    let edges = rows(graph);
    let total = edges.len();
    Ok(template.render(context! { edges => edges, total => total })?)
}

pub fn write_markdown(graph: &DependencyGraph, path: &Path) -> Result<()> {
    std::fs::write(path, render_markdown(graph)?)?;
    Ok(())
}
