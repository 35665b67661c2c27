//! Documentation corpus handed to judges.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed documentation tree: titled content nodes with nested
/// subsections.
///
/// The structure comes from an external parser and is treated as opaque;
/// judges receive it verbatim as pretty-printed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocTree(Value);

impl DocTree {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Pretty JSON form embedded into judge prompts.
    pub fn render_for_prompt(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }

    /// All `title` fields in document order.
    pub fn titles(&self) -> Vec<&str> {
        fn walk<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
            match value {
                Value::Object(obj) => {
                    if let Some(title) = obj.get("title").and_then(Value::as_str) {
                        out.push(title);
                    }
                    for (key, child) in obj {
                        if key != "title" {
                            walk(child, out);
                        }
                    }
                }
                Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.0, &mut out);
        out
    }
}
