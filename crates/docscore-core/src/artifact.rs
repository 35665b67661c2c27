//! Evaluation inputs and result files on disk.
//!
//! Layout of a results directory:
//!
//! - `<model>.json`: one scored tree per judge, `/` in the model name
//!   replaced by `_`
//! - `combined_evaluation_results.json`: the merged tree with its
//!   `combination_metadata`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::combine::CombinedEvaluation;
use crate::domain::{DocTree, DocscoreError, Rubric};
use crate::propagate::ScoredNode;

/// Default name of the combined results file.
pub const DEFAULT_COMBINED_FILE: &str = "combined_evaluation_results.json";

fn ensure_exists(kind: &'static str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(DocscoreError::InputNotFound {
            kind,
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let value = serde_json::from_str(&content).with_context(|| format!("parse {:?}", path))?;
    Ok(value)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(value).context("serialize results")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Load and normalize a rubric file.
pub fn load_rubric(path: &Path) -> Result<Rubric> {
    ensure_exists("rubric", path)?;
    let value = read_json(path)?;
    let rubric = Rubric::from_value(&value)
        .map_err(DocscoreError::from)
        .with_context(|| format!("load rubric {:?}", path))?;
    Ok(rubric)
}

/// Load the documentation tree a judge reads.
pub fn load_doc_tree(path: &Path) -> Result<DocTree> {
    ensure_exists("doc tree", path)?;
    Ok(DocTree::new(read_json(path)?))
}

/// File name of a judge's results: `openai/gpt-4o` → `openai_gpt-4o.json`.
pub fn evaluation_file_name(model: &str) -> String {
    format!("{}.json", model.replace('/', "_"))
}

/// Where a judge's results live inside `dir`.
pub fn evaluation_path(dir: &Path, model: &str) -> PathBuf {
    dir.join(evaluation_file_name(model))
}

/// Persist a scored tree as a bare JSON array.
pub fn write_scored_tree<J: Serialize>(path: &Path, nodes: &[ScoredNode<J>]) -> Result<()> {
    write_json(path, nodes)
}

/// Persist a combined result as `{rubrics, combination_metadata}`.
pub fn write_combined(path: &Path, combined: &CombinedEvaluation) -> Result<()> {
    write_json(path, combined)
}

/// Per-judge result files in `dir`, sorted by name. Files whose name
/// contains `combined` are skipped.
pub fn discover_evaluation_files(dir: &Path) -> Result<Vec<PathBuf>> {
    ensure_exists("evaluation directory", dir)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("list {:?}", dir))? {
        let path = entry.with_context(|| format!("list {:?}", dir))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.ends_with(".json") && !name.contains("combined") {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(DocscoreError::NoEvaluations {
            dir: dir.to_path_buf(),
        }
        .into());
    }
    files.sort();
    Ok(files)
}

/// Load a scored tree stored either as a bare array or as an object with a
/// `rubrics` array.
pub fn load_scored_tree<J: DeserializeOwned>(path: &Path) -> Result<Vec<ScoredNode<J>>> {
    ensure_exists("results file", path)?;
    let value = read_json(path)?;
    let nodes = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut obj) => match obj.remove("rubrics") {
            Some(rubrics @ Value::Array(_)) => rubrics,
            _ => {
                return Err(DocscoreError::UnexpectedLayout {
                    path: path.to_path_buf(),
                }
                .into())
            }
        },
        _ => {
            return Err(DocscoreError::UnexpectedLayout {
                path: path.to_path_buf(),
            }
            .into())
        }
    };
    let nodes = serde_json::from_value(nodes)
        .map_err(DocscoreError::from)
        .with_context(|| format!("decode scored tree {:?}", path))?;
    Ok(nodes)
}

/// The `combination_metadata` block of a results file, if it has one.
pub fn load_combination_metadata(path: &Path) -> Result<Option<Value>> {
    ensure_exists("results file", path)?;
    let value = read_json(path)?;
    Ok(value.get("combination_metadata").cloned())
}

/// Pick the results file to report on inside `dir`.
///
/// Prefers the combined file; falls back to the only per-judge file.
pub fn resolve_results_file(dir: &Path) -> Result<PathBuf> {
    let combined = dir.join(DEFAULT_COMBINED_FILE);
    if combined.exists() {
        return Ok(combined);
    }
    let mut files = discover_evaluation_files(dir)?;
    if files.len() > 1 {
        return Err(DocscoreError::AmbiguousResults {
            dir: dir.to_path_buf(),
            found: files.len(),
        }
        .into());
    }
    Ok(files.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeafJudgment;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn model_names_are_sanitized() {
        assert_eq!(evaluation_file_name("openai/gpt-4o"), "openai_gpt-4o.json");
        assert_eq!(evaluation_file_name("claude-sonnet-4"), "claude-sonnet-4.json");
    }

    #[test]
    fn missing_rubric_is_reported_by_kind() {
        let dir = TempDir::new().unwrap();
        let err = load_rubric(&dir.path().join("rubrics.json")).unwrap_err();
        let err = err.downcast::<DocscoreError>().unwrap();
        assert!(matches!(err, DocscoreError::InputNotFound { kind: "rubric", .. }));
    }

    #[test]
    fn malformed_rubric_surfaces_domain_error() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "rubrics.json", &json!([{"weight": 1}]));
        let err = load_rubric(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocscoreError>(),
            Some(DocscoreError::MalformedRubric(_))
        ));
    }

    #[test]
    fn discovery_skips_combined_and_non_json() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.json", &json!([]));
        write(dir.path(), "a.json", &json!([]));
        write(dir.path(), DEFAULT_COMBINED_FILE, &json!({}));
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = discover_evaluation_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn empty_directory_has_no_evaluations() {
        let dir = TempDir::new().unwrap();
        let err = discover_evaluation_files(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocscoreError>(),
            Some(DocscoreError::NoEvaluations { .. })
        ));
    }

    #[test]
    fn scored_tree_loads_from_either_layout() {
        let dir = TempDir::new().unwrap();
        let node = json!({
            "requirements": "a", "weight": 2, "score": 1.0,
            "evaluation": {"score": 1, "reasoning": "ok", "evidence": "e"},
            "sub_tasks": []
        });
        let bare = write(dir.path(), "bare.json", &json!([node.clone()]));
        let wrapped = write(
            dir.path(),
            "wrapped.json",
            &json!({"rubrics": [node], "combination_metadata": {}}),
        );

        let a: Vec<ScoredNode<LeafJudgment>> = load_scored_tree(&bare).unwrap();
        let b: Vec<ScoredNode<LeafJudgment>> = load_scored_tree(&wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].evaluation.as_ref().unwrap().reasoning, "ok");
    }

    #[test]
    fn scalar_results_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "odd.json", &json!(42));
        let err = load_scored_tree::<LeafJudgment>(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocscoreError>(),
            Some(DocscoreError::UnexpectedLayout { .. })
        ));
    }

    #[test]
    fn results_resolution_prefers_combined() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "judge-a.json", &json!([]));
        assert!(resolve_results_file(dir.path())
            .unwrap()
            .ends_with("judge-a.json"));

        write(dir.path(), "judge-b.json", &json!([]));
        assert!(resolve_results_file(dir.path()).is_err());

        write(dir.path(), DEFAULT_COMBINED_FILE, &json!({"rubrics": []}));
        assert!(resolve_results_file(dir.path())
            .unwrap()
            .ends_with(DEFAULT_COMBINED_FILE));
    }
}
