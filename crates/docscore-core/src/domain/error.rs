//! Domain-level error taxonomy for docscore.

use std::path::PathBuf;

/// Errors produced while normalizing a rubric definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RubricError {
    #[error("rubric node at {path} is not a JSON object")]
    NotAnObject { path: String },

    #[error("rubric node at {path} has neither a `name` nor a `requirements` field")]
    MissingRequirement { path: String },

    #[error("rubric node at {path} has an invalid weight: {value}")]
    InvalidWeight { path: String, value: String },

    #[error("rubric node at {path} has a child list that is not an array")]
    InvalidChildren { path: String },

    #[error("rubric nesting exceeds the maximum depth of {max_depth} at {path}")]
    TooDeep { path: String, max_depth: usize },

    #[error("rubric document must be an array or an object with a `rubrics` array")]
    InvalidDocument,
}

/// docscore domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DocscoreError {
    #[error("malformed rubric: {0}")]
    MalformedRubric(#[from] RubricError),

    #[error("{kind} not found: {}", path.display())]
    InputNotFound { kind: &'static str, path: PathBuf },

    #[error("no evaluation files found in {}", dir.display())]
    NoEvaluations { dir: PathBuf },

    #[error("at least {required} evaluations are needed to combine, found {found}")]
    NotEnoughEvaluations { required: usize, found: usize },

    #[error("invalid judge weights: {0}")]
    InvalidWeights(String),

    #[error("unknown combination method: {0}")]
    UnknownMethod(String),

    #[error("unknown report format: {0}")]
    UnknownFormat(String),

    #[error("{found} judge result files in {}; pass a results file or combine them first", dir.display())]
    AmbiguousResults { dir: PathBuf, found: usize },

    #[error("unexpected results layout in {}", path.display())]
    UnexpectedLayout { path: PathBuf },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for docscore domain operations.
pub type Result<T> = std::result::Result<T, DocscoreError>;
