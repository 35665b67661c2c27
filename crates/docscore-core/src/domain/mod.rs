//! Domain models for docscore.
//!
//! - `Rubric` / `RubricNode`: the weighted requirement tree
//! - `NodePath`: positional node address, the key for every judgment
//! - `LeafJudgment` / `CombinedLeafJudgment`: per-leaf verdicts
//! - `DocTree`: the documentation corpus under evaluation

pub mod doc_tree;
pub mod error;
pub mod judgment;
pub mod rubric;

pub use doc_tree::DocTree;
pub use error::{DocscoreError, Result, RubricError};
pub use judgment::{
    CombinedJudgmentMap, CombinedLeafJudgment, JudgmentMap, LeafJudgment, LeafScore, TokenUsage,
    RETRYABLE_TAGS, TAG_EVALUATION_ERROR, TAG_FINAL_FALLBACK, TAG_PARSING_ERROR,
    TAG_PARSING_FALLBACK,
};
pub use rubric::{NodePath, ParsePathError, Rubric, RubricNode, DEFAULT_WEIGHT, MAX_DEPTH};
