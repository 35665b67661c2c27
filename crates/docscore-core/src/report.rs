//! Human-readable views of a scored tree.
//!
//! Works on either a single judge's results or a combined file: only the
//! fields both share are read.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{DocscoreError, NodePath};
use crate::judge::parse::excerpt;
use crate::propagate::{overall_score, ScoredNode};

/// Score above which a node counts as documented in the detailed view.
const DETAILED_PASS: f64 = 0.5;
/// Markdown status thresholds.
const MARKDOWN_GOOD: f64 = 0.7;
const MARKDOWN_PARTIAL: f64 = 0.3;
/// Evidence shown per leaf in the detailed view.
const DETAILED_EVIDENCE_CHARS: usize = 100;
/// Requirement text shown per category in the summary view.
const SUMMARY_REQUIREMENT_CHARS: usize = 80;

const BANNER: &str = "============================================================";

/// Leaf evaluation fields shared by per-judge and combined results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEvaluation {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

pub type ReportNode = ScoredNode<ReportEvaluation>;

/// Output shape of `docscore report`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Summary,
    Detailed,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detailed => "detailed",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
        }
    }

    /// File extension for formats written next to the results file.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Csv => Some("csv"),
            Self::Markdown => Some("md"),
            Self::Summary | Self::Detailed => None,
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = DocscoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "detailed" => Ok(Self::Detailed),
            "csv" => Ok(Self::Csv),
            "markdown" => Ok(Self::Markdown),
            other => Err(DocscoreError::UnknownFormat(other.to_string())),
        }
    }
}

/// Headline numbers over a whole scored tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallMetrics {
    pub overall_score: f64,
    pub average_leaf_score: f64,
    pub total_requirements: usize,
    pub leaf_requirements: usize,
    pub documented_leaves: usize,
    pub coverage_percentage: f64,
}

/// Every node in pre-order with its path.
pub fn flatten(nodes: &[ReportNode]) -> Vec<(NodePath, &ReportNode)> {
    let mut out = Vec::new();
    let mut stack: Vec<(NodePath, &ReportNode)> = nodes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (NodePath::root().child(i), n))
        .collect();
    while let Some((path, node)) = stack.pop() {
        for (i, child) in node.sub_tasks.iter().enumerate().rev() {
            stack.push((path.child(i), child));
        }
        out.push((path, node));
    }
    out
}

pub fn overall_metrics(nodes: &[ReportNode]) -> OverallMetrics {
    let all = flatten(nodes);
    let leaf_scores: Vec<f64> = all
        .iter()
        .filter(|(_, n)| n.is_leaf())
        .map(|(_, n)| n.score)
        .collect();
    let documented = leaf_scores.iter().filter(|s| **s > 0.0).count();
    let (average, coverage) = if leaf_scores.is_empty() {
        (0.0, 0.0)
    } else {
        let n = leaf_scores.len() as f64;
        (
            leaf_scores.iter().sum::<f64>() / n,
            documented as f64 / n * 100.0,
        )
    };
    OverallMetrics {
        overall_score: overall_score(nodes),
        average_leaf_score: average,
        total_requirements: all.len(),
        leaf_requirements: leaf_scores.len(),
        documented_leaves: documented,
        coverage_percentage: coverage,
    }
}

pub fn render_summary(nodes: &[ReportNode]) -> String {
    let m = overall_metrics(nodes);
    let mut out = String::new();
    out.push_str(&format!("{BANNER}\nDOCUMENTATION EVALUATION SUMMARY\n{BANNER}\n"));
    out.push_str(&format!("Overall Score: {:.4}\n", m.overall_score));
    out.push_str(&format!("Average Leaf Score: {:.4}\n", m.average_leaf_score));
    out.push_str(&format!(
        "Coverage: {}/{} leaf requirements ({:.1}%)\n",
        m.documented_leaves, m.leaf_requirements, m.coverage_percentage
    ));
    out.push_str(&format!("Total Requirements: {}\n\n", m.total_requirements));
    out.push_str("TOP-LEVEL CATEGORY SCORES:\n");
    out.push_str(&format!("{}\n", "-".repeat(40)));
    for (i, node) in nodes.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}...\n   Score: {:.4} | Weight: {}\n\n",
            i + 1,
            excerpt(&node.requirements, SUMMARY_REQUIREMENT_CHARS),
            node.score,
            node.weight
        ));
    }
    out
}

/// Tree view restricted to nodes scored inside `[min_score, max_score]`.
/// A node outside the window hides its whole subtree.
pub fn render_detailed(nodes: &[ReportNode], min_score: f64, max_score: f64) -> String {
    fn item(out: &mut String, node: &ReportNode, indent: usize, min: f64, max: f64) {
        if !(min..=max).contains(&node.score) {
            return;
        }
        let prefix = "  ".repeat(indent);
        let status = if node.score > DETAILED_PASS { "✓" } else { "✗" };
        out.push_str(&format!(
            "{prefix}{status} [{:.4}] {}\n",
            node.score, node.requirements
        ));
        if let Some(eval) = &node.evaluation {
            out.push_str(&format!(
                "{prefix}    Reasoning: {}\n",
                eval.reasoning.as_deref().unwrap_or("N/A")
            ));
            if let Some(evidence) = eval.evidence.as_deref().filter(|e| !e.is_empty()) {
                let shown = if evidence.chars().count() > DETAILED_EVIDENCE_CHARS {
                    format!("{}...", excerpt(evidence, DETAILED_EVIDENCE_CHARS))
                } else {
                    evidence.to_string()
                };
                out.push_str(&format!("{prefix}    Evidence: {shown}\n"));
            }
        }
        for child in &node.sub_tasks {
            item(out, child, indent + 1, min, max);
        }
    }

    let mut out = String::new();
    out.push_str(&format!("{BANNER}\nDETAILED EVALUATION RESULTS\n{BANNER}\n"));
    out.push_str(&format!(
        "Showing items with score between {min_score} and {max_score}\n\n"
    ));
    for node in nodes {
        item(&mut out, node, 0, min_score, max_score);
        out.push('\n');
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// One row per node: path, requirement, score, weight, is_leaf, reasoning, evidence.
pub fn render_csv(nodes: &[ReportNode]) -> String {
    let mut out = String::from("path,requirement,score,weight,is_leaf,reasoning,evidence\n");
    for (path, node) in flatten(nodes) {
        let (reasoning, evidence) = node
            .evaluation
            .as_ref()
            .map(|e| {
                (
                    e.reasoning.clone().unwrap_or_default(),
                    e.evidence.clone().unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        let row = [
            path.to_string(),
            csv_field(&node.requirements),
            node.score.to_string(),
            node.weight.to_string(),
            node.is_leaf().to_string(),
            csv_field(&reasoning),
            csv_field(&evidence),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn render_markdown(nodes: &[ReportNode]) -> String {
    fn item(out: &mut String, node: &ReportNode, level: usize) {
        let status = if node.score > MARKDOWN_GOOD {
            "✅"
        } else if node.score > MARKDOWN_PARTIAL {
            "⚠️"
        } else {
            "❌"
        };
        out.push_str(&format!(
            "{} {status} {} (Score: {:.4})\n\n",
            "#".repeat(level),
            node.requirements,
            node.score
        ));
        if let Some(eval) = &node.evaluation {
            out.push_str(&format!(
                "**Reasoning:** {}\n\n",
                eval.reasoning.as_deref().unwrap_or("N/A")
            ));
            if let Some(evidence) = eval.evidence.as_deref().filter(|e| !e.is_empty()) {
                out.push_str(&format!("**Evidence:** {evidence}\n\n"));
            }
        }
        for child in &node.sub_tasks {
            item(out, child, level + 1);
        }
    }

    let m = overall_metrics(nodes);
    let mut out = String::from("# Documentation Evaluation Results\n\n");
    out.push_str(&format!("**Overall Score:** {:.4}\n", m.overall_score));
    out.push_str(&format!("**Coverage:** {:.1}%\n", m.coverage_percentage));
    out.push_str(&format!("**Total Requirements:** {}\n\n", m.total_requirements));
    for node in nodes {
        item(&mut out, node, 1);
    }
    out
}

/// Write a rendered report next to `results`, swapping the extension.
pub fn write_report(
    results: &Path,
    format: ReportFormat,
    content: &str,
) -> Result<Option<PathBuf>> {
    let Some(ext) = format.extension() else {
        return Ok(None);
    };
    let path = results.with_extension(ext);
    std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Vec<ReportNode> {
        serde_json::from_value(json!([
            {
                "requirements": "Installation", "weight": 3, "score": 0.75,
                "sub_tasks": [
                    {"requirements": "Prerequisites", "weight": 3, "score": 1,
                     "evaluation": {"score": 1, "reasoning": "listed", "evidence": "See \"Setup\", step 1"}},
                    {"requirements": "Troubleshooting", "weight": 1, "score": 0,
                     "evaluation": {"score": 0, "reasoning": "absent", "evidence": ""}}
                ]
            },
            {"requirements": "License", "weight": 1, "score": 0.0,
             "evaluation": {"score": 0, "reasoning": "missing"}}
        ]))
        .unwrap()
    }

    #[test]
    fn metrics_cover_every_node() {
        let m = overall_metrics(&tree());
        assert_eq!(m.total_requirements, 4);
        assert_eq!(m.leaf_requirements, 3);
        assert_eq!(m.documented_leaves, 1);
        assert!((m.overall_score - 0.5625).abs() < 1e-9);
        assert!((m.coverage_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn detailed_window_hides_subtrees() {
        let text = render_detailed(&tree(), 0.5, 1.0);
        assert!(text.contains("✓ [0.7500] Installation"));
        assert!(text.contains("  ✓ [1.0000] Prerequisites"));
        assert!(!text.contains("Troubleshooting"));
        assert!(!text.contains("License"));
    }

    #[test]
    fn detailed_truncates_long_evidence() {
        let long = "x".repeat(150);
        let nodes: Vec<ReportNode> = serde_json::from_value(json!([
            {"requirements": "a", "weight": 1, "score": 1,
             "evaluation": {"score": 1, "reasoning": "r", "evidence": long}}
        ]))
        .unwrap();
        let text = render_detailed(&nodes, 0.0, 1.0);
        assert!(text.contains(&format!("Evidence: {}...", "x".repeat(100))));
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        let csv = render_csv(&tree());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "path,requirement,score,weight,is_leaf,reasoning,evidence");
        assert_eq!(lines[1], "0,Installation,0.75,3,false,,");
        assert_eq!(
            lines[2],
            "0.0,Prerequisites,1,3,true,listed,\"See \"\"Setup\"\", step 1\""
        );
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn markdown_nests_headings_with_status() {
        let md = render_markdown(&tree());
        assert!(md.starts_with("# Documentation Evaluation Results"));
        assert!(md.contains("# ✅ Installation (Score: 0.7500)"));
        assert!(md.contains("## ✅ Prerequisites (Score: 1.0000)"));
        assert!(md.contains("# ❌ License (Score: 0.0000)"));
        assert!(md.contains("**Reasoning:** missing"));
    }

    #[test]
    fn formats_parse_by_name() {
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!("pdf".parse::<ReportFormat>().is_err());
        assert_eq!(ReportFormat::Markdown.extension(), Some("md"));
    }

    #[test]
    fn file_formats_are_written_beside_the_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let results = dir.path().join("judge.json");

        let written = write_report(&results, ReportFormat::Csv, "path\n").unwrap();
        assert_eq!(written, Some(dir.path().join("judge.csv")));
        assert_eq!(std::fs::read_to_string(dir.path().join("judge.csv")).unwrap(), "path\n");

        assert_eq!(write_report(&results, ReportFormat::Summary, "x").unwrap(), None);
    }
}
