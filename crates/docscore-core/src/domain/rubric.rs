//! Requirement tree model.
//!
//! Rubric definitions arrive in one of two shapes:
//!
//! - `{name, description?, weight?, reference?, children?}`
//! - `{requirements, weight?, reference?, sub_tasks?}`
//!
//! Both are normalized at ingestion into [`RubricNode`]; nothing past this
//! module looks at the raw field names again. Every node carries its
//! [`NodePath`], the positional address used as the key for judgments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::domain::error::RubricError;

/// Maximum nesting accepted at ingestion. Every recursive walk in the crate
/// relies on this bound.
pub const MAX_DEPTH: usize = 64;

/// Weight assigned when a node omits one.
pub const DEFAULT_WEIGHT: u32 = 2;

/// Positional address of a node from the top-level rubric list.
///
/// Ordering is lexicographic over the indices, which matches depth-first
/// traversal order, so a `BTreeMap<NodePath, _>` iterates leaves in the same
/// order the collector produces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The empty path (parent of the top-level items).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the `index`-th child of this node.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

/// Error returned when a dotted path string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node path: {0:?}")]
pub struct ParsePathError(pub String);

impl FromStr for NodePath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        s.split('.')
            .map(|part| part.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| ParsePathError(s.to_string()))
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single weighted, possibly nested documentation requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricNode {
    #[serde(rename = "requirements")]
    pub requirement: String,
    pub weight: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<Value>,
    #[serde(rename = "sub_tasks")]
    pub children: Vec<RubricNode>,
    #[serde(skip)]
    pub path: NodePath,
}

impl RubricNode {
    /// A node is a leaf iff it has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A normalized rubric: the ordered list of top-level requirement trees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Rubric {
    nodes: Vec<RubricNode>,
}

impl Rubric {
    /// Normalize a rubric document.
    ///
    /// Accepts either a bare array of nodes or an object carrying a
    /// `rubrics` array.
    pub fn from_value(value: &Value) -> Result<Self, RubricError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(obj) => obj
                .get("rubrics")
                .and_then(Value::as_array)
                .ok_or(RubricError::InvalidDocument)?,
            _ => return Err(RubricError::InvalidDocument),
        };
        let root = NodePath::root();
        let nodes = items
            .iter()
            .enumerate()
            .map(|(i, item)| normalize_node(item, root.child(i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nodes })
    }

    /// Build a rubric from already-canonical nodes, reassigning paths.
    pub fn from_nodes(mut nodes: Vec<RubricNode>) -> Self {
        fn assign(nodes: &mut [RubricNode], parent: &NodePath) {
            for (i, node) in nodes.iter_mut().enumerate() {
                node.path = parent.child(i);
                let path = node.path.clone();
                assign(&mut node.children, &path);
            }
        }
        assign(&mut nodes, &NodePath::root());
        Self { nodes }
    }

    pub fn nodes(&self) -> &[RubricNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by path.
    pub fn node(&self, path: &NodePath) -> Option<&RubricNode> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.nodes.get(*first)?;
        for index in rest {
            node = node.children.get(*index)?;
        }
        Some(node)
    }
}

impl<'de> Deserialize<'de> for Rubric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Rubric::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn normalize_node(value: &Value, path: NodePath) -> Result<RubricNode, RubricError> {
    if path.depth() > MAX_DEPTH {
        return Err(RubricError::TooDeep {
            path: path.to_string(),
            max_depth: MAX_DEPTH,
        });
    }
    let obj = value.as_object().ok_or_else(|| RubricError::NotAnObject {
        path: path.to_string(),
    })?;

    let (requirement, children_key) = if obj.contains_key("name") {
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RubricError::MissingRequirement {
                path: path.to_string(),
            })?;
        let requirement = match obj.get("description").and_then(Value::as_str) {
            Some(description) => format!("{name}: {description}"),
            None => name.to_string(),
        };
        (requirement, "children")
    } else {
        let requirement = obj
            .get("requirements")
            .and_then(Value::as_str)
            .ok_or_else(|| RubricError::MissingRequirement {
                path: path.to_string(),
            })?;
        (requirement.to_string(), "sub_tasks")
    };

    let weight = normalize_weight(obj, &path)?;

    let reference = match obj.get("reference") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };

    let other_key = if children_key == "children" {
        "sub_tasks"
    } else {
        "children"
    };
    let child_list = match obj.get(children_key) {
        None | Some(Value::Null) => obj.get(other_key),
        found => found,
    };
    let children = match child_list {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, child)| normalize_node(child, path.child(i)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(RubricError::InvalidChildren {
                path: path.to_string(),
            })
        }
    };

    Ok(RubricNode {
        requirement,
        weight,
        reference,
        children,
        path,
    })
}

fn normalize_weight(obj: &Map<String, Value>, path: &NodePath) -> Result<u32, RubricError> {
    match obj.get("weight") {
        None | Some(Value::Null) => Ok(DEFAULT_WEIGHT),
        Some(value) => value
            .as_u64()
            .filter(|w| *w >= 1)
            .and_then(|w| u32::try_from(w).ok())
            .ok_or_else(|| RubricError::InvalidWeight {
                path: path.to_string(),
                value: value.to_string(),
            }),
    }
}
