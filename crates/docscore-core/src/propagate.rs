//! Bottom-up score propagation.
//!
//! Leaves take their judged score; every internal node takes the weighted
//! mean of its direct children. When the judgments carry a spread (combined
//! mode) each node also gets a `std`, combined as a weighted quadrature.
//! The rubric is never mutated; propagation builds a parallel scored tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{LeafScore, NodePath, Rubric, RubricNode, DEFAULT_WEIGHT};
use crate::obs;

use std::collections::BTreeMap;

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

/// A rubric node after propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "J: Deserialize<'de>"))]
pub struct ScoredNode<J> {
    pub requirements: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<Value>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    /// Judgment that produced the score; present on leaves only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<J>,
    #[serde(default)]
    pub sub_tasks: Vec<ScoredNode<J>>,
}

impl<J> ScoredNode<J> {
    pub fn is_leaf(&self) -> bool {
        self.sub_tasks.is_empty()
    }
}

/// A leaf with no judgment. Scored 0, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralGap {
    pub path: NodePath,
    pub requirement: String,
}

/// Scored tree plus every gap met on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation<J> {
    pub nodes: Vec<ScoredNode<J>>,
    pub gaps: Vec<StructuralGap>,
}

impl<J> Propagation<J> {
    /// Weighted mean over the top-level items.
    pub fn overall_score(&self) -> f64 {
        overall_score(&self.nodes)
    }

    /// Weighted quadrature over the top-level items, `None` without spread.
    pub fn overall_std(&self) -> Option<f64> {
        overall_std(&self.nodes)
    }
}

/// Score every node of `rubric` from the leaf `judgments`.
pub fn propagate<J>(rubric: &Rubric, judgments: &BTreeMap<NodePath, J>) -> Propagation<J>
where
    J: LeafScore + Clone,
{
    let mut gaps = Vec::new();
    let nodes = rubric
        .nodes()
        .iter()
        .map(|node| score_node(node, judgments, &mut gaps))
        .collect();
    Propagation { nodes, gaps }
}

// Recursion depth is bounded by MAX_DEPTH, enforced when the rubric is built.
fn score_node<J>(
    node: &RubricNode,
    judgments: &BTreeMap<NodePath, J>,
    gaps: &mut Vec<StructuralGap>,
) -> ScoredNode<J>
where
    J: LeafScore + Clone,
{
    if node.is_leaf() {
        let evaluation = judgments.get(&node.path).cloned();
        let (score, std) = match &evaluation {
            Some(judgment) => (
                judgment.score(),
                J::HAS_SPREAD.then(|| judgment.std().unwrap_or(0.0)),
            ),
            None => {
                obs::emit_structural_gap(&node.path.to_string());
                gaps.push(StructuralGap {
                    path: node.path.clone(),
                    requirement: node.requirement.clone(),
                });
                (0.0, J::HAS_SPREAD.then_some(0.0))
            }
        };
        return ScoredNode {
            requirements: node.requirement.clone(),
            weight: node.weight,
            reference: node.reference.clone(),
            score,
            std,
            evaluation,
            sub_tasks: Vec::new(),
        };
    }

    let sub_tasks: Vec<ScoredNode<J>> = node
        .children
        .iter()
        .map(|child| score_node(child, judgments, gaps))
        .collect();
    ScoredNode {
        requirements: node.requirement.clone(),
        weight: node.weight,
        reference: node.reference.clone(),
        score: overall_score(&sub_tasks),
        std: if J::HAS_SPREAD {
            overall_std(&sub_tasks)
        } else {
            None
        },
        evaluation: None,
        sub_tasks,
    }
}

/// Rebuild the rubric a scored tree was produced from.
pub fn rubric_shape<J>(nodes: &[ScoredNode<J>]) -> Rubric {
    fn strip<J>(node: &ScoredNode<J>) -> RubricNode {
        RubricNode {
            requirement: node.requirements.clone(),
            weight: node.weight,
            reference: node.reference.clone(),
            children: node.sub_tasks.iter().map(strip).collect(),
            path: NodePath::root(),
        }
    }
    Rubric::from_nodes(nodes.iter().map(strip).collect())
}

/// Leaf judgments of a scored tree keyed by path. Leaves without an
/// `evaluation` are skipped.
pub fn leaf_evaluations<J: Clone>(nodes: &[ScoredNode<J>]) -> BTreeMap<NodePath, J> {
    let mut found = BTreeMap::new();
    let mut stack: Vec<(NodePath, &ScoredNode<J>)> = nodes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, node)| (NodePath::root().child(i), node))
        .collect();
    while let Some((path, node)) = stack.pop() {
        if node.is_leaf() {
            if let Some(evaluation) = &node.evaluation {
                found.insert(path, evaluation.clone());
            }
            continue;
        }
        for (i, child) in node.sub_tasks.iter().enumerate().rev() {
            stack.push((path.child(i), child));
        }
    }
    found
}

/// `Σ(sᵢwᵢ) / Σwᵢ`, or 0 when the weights sum to zero.
pub fn weighted_mean(items: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = items.iter().map(|(_, w)| w).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    items.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
}

/// `sqrt(Σwᵢ²σᵢ²) / Σwᵢ`, or 0 when the weights sum to zero.
pub fn weighted_quadrature(items: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = items.iter().map(|(_, w)| w).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    let variance: f64 = items.iter().map(|(s, w)| w * w * s * s).sum();
    variance.sqrt() / total_weight
}

/// Weighted mean of the scores of `nodes`.
pub fn overall_score<J>(nodes: &[ScoredNode<J>]) -> f64 {
    let items: Vec<(f64, f64)> = nodes
        .iter()
        .map(|n| (n.score, f64::from(n.weight)))
        .collect();
    weighted_mean(&items)
}

/// Weighted quadrature of the spreads of `nodes`; `None` if none carries one.
pub fn overall_std<J>(nodes: &[ScoredNode<J>]) -> Option<f64> {
    if !nodes.iter().any(|n| n.std.is_some()) {
        return None;
    }
    let items: Vec<(f64, f64)> = nodes
        .iter()
        .map(|n| (n.std.unwrap_or(0.0), f64::from(n.weight)))
        .collect();
    Some(weighted_quadrature(&items))
}
