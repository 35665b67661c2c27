//! Leaf collection.
//!
//! The order produced here drives batch order downstream, so it must be
//! reproducible: depth-first, children in stored order.

use serde::Serialize;

use crate::domain::{NodePath, Rubric, RubricNode};

/// A leaf requirement ready to be judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafRequirement {
    pub path: NodePath,
    pub requirement: String,
    pub weight: u32,
}

/// Collect every leaf of `rubric` in depth-first order.
pub fn collect_leaves(rubric: &Rubric) -> Vec<LeafRequirement> {
    let mut leaves = Vec::new();
    let mut stack: Vec<&RubricNode> = rubric.nodes().iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.is_leaf() {
            leaves.push(LeafRequirement {
                path: node.path.clone(),
                requirement: node.requirement.clone(),
                weight: node.weight,
            });
        } else {
            stack.extend(node.children.iter().rev());
        }
    }
    leaves
}
