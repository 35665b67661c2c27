//! docscore core library
//!
//! Scores a documentation corpus against a weighted requirement rubric using
//! LLM judges, then aggregates several judges into one result with a spread.

pub mod artifact;
pub mod combine;
pub mod config;
pub mod domain;
pub mod evaluator;
pub mod fakes;
pub mod judge;
pub mod leaves;
pub mod metrics;
pub mod obs;
pub mod propagate;
pub mod report;
pub mod summary;
pub mod telemetry;

pub use domain::{
    CombinedJudgmentMap, CombinedLeafJudgment, DocTree, DocscoreError, JudgmentMap, LeafJudgment,
    LeafScore, NodePath, Result, Rubric, RubricError, RubricNode, TokenUsage, DEFAULT_WEIGHT,
    MAX_DEPTH,
};

pub use artifact::{
    discover_evaluation_files, evaluation_path, load_doc_tree, load_rubric, load_scored_tree,
    resolve_results_file, write_combined, write_scored_tree, DEFAULT_COMBINED_FILE,
};
pub use combine::{
    combine_evaluations, combine_leaf_judgments, parse_weights, CombinationMetadata,
    CombinationMethod, CombineConfig, CombinedEvaluation,
};
pub use config::{EvaluatorConfig, JudgeEndpoint};
pub use evaluator::{EvaluationOutcome, Evaluator, RetryReport, ScoredRun};
pub use judge::http::HttpJudge;
pub use judge::{JudgeClient, JudgeFailure, JudgeReply};
pub use leaves::{collect_leaves, LeafRequirement};
pub use metrics::JudgeMetrics;
pub use obs::RunSpan;
pub use propagate::{propagate, Propagation, ScoredNode, StructuralGap};
pub use report::{ReportFormat, ReportNode};
pub use summary::{render_combination_summary, RunSummary};
pub use telemetry::init_tracing;

/// docscore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
