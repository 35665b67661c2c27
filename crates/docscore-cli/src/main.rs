//! docscore - documentation scoring with LLM judges
//!
//! ## Commands
//!
//! - `evaluate`: score a documentation tree against a rubric with one judge
//! - `combine`: merge several judges' results into one scored tree
//! - `report`: render a results file as a summary, tree, CSV or Markdown

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use docscore_core::artifact::load_combination_metadata;
use docscore_core::config::{DEFAULT_API_KEY, DEFAULT_BASE_URL, DEFAULT_MODEL};
use docscore_core::report::{
    render_csv, render_detailed, render_markdown, render_summary, write_report,
};
use docscore_core::{
    combine_evaluations, discover_evaluation_files, evaluation_path, load_doc_tree, load_rubric,
    load_scored_tree, parse_weights, render_combination_summary, resolve_results_file,
    write_combined, write_scored_tree, CombinationMethod, CombineConfig, Evaluator,
    EvaluatorConfig, HttpJudge, JudgeEndpoint, LeafJudgment, ReportFormat, ReportNode, RunSpan,
    RunSummary, DEFAULT_COMBINED_FILE,
};

#[derive(Parser)]
#[command(name = "docscore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score documentation against a requirement rubric with LLM judges", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge every leaf requirement of a rubric against a documentation tree
    Evaluate(EvaluateArgs),

    /// Combine the per-judge results found in a directory
    Combine(CombineArgs),

    /// Render a results file
    Report(ReportArgs),
}

#[derive(Args)]
struct EvaluateArgs {
    /// Rubric JSON (array of nodes or `{"rubrics": [...]}`)
    #[arg(long)]
    rubric: PathBuf,

    /// Documentation tree JSON
    #[arg(long)]
    docs: PathBuf,

    /// Directory receiving `<model>.json`
    #[arg(long, default_value = "evaluation_results")]
    output_dir: PathBuf,

    /// OpenAI-compatible API root
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    api_key: String,

    /// Judge model name
    #[arg(long, env = "MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Leaves judged concurrently per batch
    #[arg(long, default_value = "5")]
    batch_size: usize,

    /// Re-judge degraded leaves after the first pass
    #[arg(long)]
    enable_retry: bool,

    /// Extra attempts per degraded leaf
    #[arg(long, default_value = "2")]
    max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "300")]
    timeout_secs: u64,

    /// Overwrite an existing results file
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct CombineArgs {
    /// Directory holding per-judge results
    #[arg(long, default_value = "evaluation_results")]
    input_dir: PathBuf,

    /// Output file name, relative to the input directory
    #[arg(long, default_value = DEFAULT_COMBINED_FILE)]
    output_file: PathBuf,

    /// average, majority_vote, weighted_average, max or min
    #[arg(long, default_value = "average")]
    method: CombinationMethod,

    /// Comma-separated judge weights for weighted_average, e.g. `0.4,0.3,0.3`
    #[arg(long)]
    weights: Option<String>,

    /// Recorded in the metadata only
    #[arg(long, default_value = "0.0")]
    confidence_threshold: f64,
}

#[derive(Args)]
struct ReportArgs {
    /// Results file to render
    #[arg(long, conflicts_with = "results_dir")]
    results_file: Option<PathBuf>,

    /// Directory to pick the results file from (combined first)
    #[arg(long, default_value = "evaluation_results")]
    results_dir: PathBuf,

    /// summary, detailed, csv or markdown
    #[arg(long, default_value = "summary")]
    format: ReportFormat,

    /// Only show items with score >= this value (detailed)
    #[arg(long, default_value = "0.0")]
    min_score: f64,

    /// Only show items with score <= this value (detailed)
    #[arg(long, default_value = "1.0")]
    max_score: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    docscore_core::init_tracing(cli.json, level);

    let run_id = uuid::Uuid::new_v4().to_string();
    let _span = RunSpan::enter(&run_id);

    match cli.command {
        Commands::Evaluate(args) => cmd_evaluate(args).await,
        Commands::Combine(args) => cmd_combine(args),
        Commands::Report(args) => cmd_report(args),
    }
}

async fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let output = evaluation_path(&args.output_dir, &args.model);
    if output.exists() && !args.force {
        info!(path = ?output, "results already exist; skipping");
        println!("Evaluation file already exists: {}", output.display());
        println!("Pass --force to evaluate again.");
        return Ok(());
    }

    let rubric = load_rubric(&args.rubric)?;
    let docs = load_doc_tree(&args.docs)?;
    info!(
        rubric = ?args.rubric,
        sections = docs.titles().len(),
        model = %args.model,
        "inputs loaded"
    );

    let endpoint = JudgeEndpoint {
        base_url: args.base_url,
        api_key: args.api_key,
        model: args.model.clone(),
        request_timeout: Duration::from_secs(args.timeout_secs),
    };
    let judge = HttpJudge::new(endpoint).context("Failed to build judge client")?;
    let config = EvaluatorConfig::default()
        .with_batch_size(args.batch_size)
        .with_retry(args.enable_retry, args.max_retries);

    let evaluator = Evaluator::new(Arc::new(judge), docs, config);
    let run = evaluator.score(&rubric).await;

    write_scored_tree(&output, &run.propagation.nodes)?;
    println!("Evaluation results saved to: {}", output.display());
    if !run.propagation.gaps.is_empty() {
        warn!(gaps = run.propagation.gaps.len(), "leaves without a judgment scored 0");
    }

    let summary = RunSummary::from_judgments(
        &args.model,
        &run.outcome.judgments,
        evaluator.metrics().tokens(),
        run.propagation.overall_score(),
    );
    print!("{}", summary.render());
    Ok(())
}

fn cmd_combine(args: CombineArgs) -> Result<()> {
    let files = discover_evaluation_files(&args.input_dir)?;
    println!("Found {} evaluation files:", files.len());
    for file in &files {
        println!("  - {}", file_label(file));
    }

    let mut evaluations = Vec::with_capacity(files.len());
    for file in &files {
        match load_scored_tree::<LeafJudgment>(file) {
            Ok(nodes) => evaluations.push(nodes),
            Err(e) => warn!(file = ?file, error = %e, "skipping unreadable results file"),
        }
    }

    let weights = args
        .weights
        .as_deref()
        .map(parse_weights)
        .transpose()
        .context("Failed to parse --weights")?;
    let config = CombineConfig {
        method: args.method,
        weights,
        confidence_threshold: args.confidence_threshold,
    };
    info!(method = %config.method, judges = evaluations.len(), "combining evaluations");

    let combined = combine_evaluations(&evaluations, &config)?;
    let output = args.input_dir.join(&args.output_file);
    write_combined(&output, &combined)?;
    println!("Combined evaluation results saved to: {}", output.display());
    print!("{}", render_combination_summary(&combined));
    Ok(())
}

fn cmd_report(args: ReportArgs) -> Result<()> {
    let results = match args.results_file {
        Some(path) => path,
        None => resolve_results_file(&args.results_dir)?,
    };
    let nodes: Vec<ReportNode> = load_scored_tree(&results)?;

    if let Some(meta) = load_combination_metadata(&results)? {
        println!(
            "Using combined results from {} evaluations",
            meta.get("num_evaluations_combined")
                .map_or_else(|| "unknown".to_string(), |v| v.to_string())
        );
        println!(
            "Combination method: {}\n",
            meta.get("combination_method")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
        );
    }

    let rendered = match args.format {
        ReportFormat::Summary => render_summary(&nodes),
        ReportFormat::Detailed => render_detailed(&nodes, args.min_score, args.max_score),
        ReportFormat::Csv => render_csv(&nodes),
        ReportFormat::Markdown => render_markdown(&nodes),
    };
    match write_report(&results, args.format, &rendered)? {
        Some(path) => println!("Results exported to {}", path.display()),
        None => print!("{rendered}"),
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn combine_parses_method_and_weights() {
        let cli = Cli::parse_from([
            "docscore",
            "combine",
            "--method",
            "weighted_average",
            "--weights",
            "0.5,0.5",
        ]);
        match cli.command {
            Commands::Combine(args) => {
                assert_eq!(args.method, CombinationMethod::WeightedAverage);
                assert_eq!(args.weights.as_deref(), Some("0.5,0.5"));
                assert_eq!(args.output_file, PathBuf::from(DEFAULT_COMBINED_FILE));
            }
            _ => panic!("expected combine"),
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(Cli::try_parse_from(["docscore", "combine", "--method", "median"]).is_err());
    }

    #[test]
    fn report_defaults_to_summary() {
        let cli = Cli::parse_from(["docscore", "--verbose", "report"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Report(args) => {
                assert_eq!(args.format, ReportFormat::Summary);
                assert_eq!(args.max_score, 1.0);
            }
            _ => panic!("expected report"),
        }
    }
}
