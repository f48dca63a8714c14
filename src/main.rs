use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use arbiter::io::{
    apply_stage_overrides, format_analysis_summary, format_comparison_summary, load_analysis,
    load_definitions, load_stage_overrides, read_transcript, write_analysis, write_comparison,
};
use arbiter::{
    run_analysis, run_comparison, AnalysisRequest, AnthropicClient, AnthropicConfig,
    ComparisonRequest, Criterion, EvaluatorRegistry, RetryPolicy, DEFAULT_JUDGE_MODEL,
};

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(author, version, about = "Multi-stage LLM transcript analysis and comparison", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a transcript: facts -> insights -> summary, then run the
    /// selected evaluations against the result
    Analyze {
        /// Input transcript file (plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the analysis result (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Evaluation definitions file (JSON array)
        #[arg(short, long)]
        definitions: Option<PathBuf>,

        /// Display title; defaults to the transcript's first line
        #[arg(long)]
        title: Option<String>,

        /// Model for all three stages (per-stage override via --stages)
        #[arg(long, default_value = "claude-sonnet-4-20250514")]
        model: String,

        /// Per-stage overrides file (JSON: facts/insights/summary blocks)
        #[arg(long)]
        stages: Option<PathBuf>,

        /// Evaluation definition id to run (repeatable); all loaded
        /// definitions when omitted
        #[arg(long = "eval")]
        evaluations: Vec<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare two completed analyses with a judge model
    Compare {
        /// Stored analysis result A (JSON)
        #[arg(long)]
        analysis_a: PathBuf,

        /// Stored analysis result B (JSON)
        #[arg(long)]
        analysis_b: PathBuf,

        /// Output file for the comparison result (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Judge model
        #[arg(long, default_value = DEFAULT_JUDGE_MODEL)]
        judge_model: String,

        /// Criterion to score (repeatable: groundedness, faithfulness,
        /// completeness, clarity, accuracy); all five when omitted
        #[arg(long = "criterion")]
        criteria: Vec<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            definitions,
            title,
            model,
            stages,
            evaluations,
            verbose,
        } => {
            setup_logging(verbose);
            analyze(input, output, definitions, title, model, stages, evaluations).await
        }
        Commands::Compare {
            analysis_a,
            analysis_b,
            output,
            judge_model,
            criteria,
            verbose,
        } => {
            setup_logging(verbose);
            compare(analysis_a, analysis_b, output, judge_model, criteria).await
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn analyze(
    input: PathBuf,
    output: PathBuf,
    definitions_path: Option<PathBuf>,
    title: Option<String>,
    model: String,
    stages_path: Option<PathBuf>,
    evaluations: Vec<String>,
) -> Result<()> {
    info!("Loading transcript from {:?}", input);
    let transcript = read_transcript(&input)?;

    let definitions = match &definitions_path {
        Some(path) => load_definitions(path)?,
        None => Vec::new(),
    };
    info!("Loaded {} evaluation definitions", definitions.len());

    let mut request = AnalysisRequest::new(transcript, &model);
    request.title = title;
    request.evaluation_ids = if evaluations.is_empty() {
        definitions.iter().map(|d| d.id.clone()).collect()
    } else {
        evaluations
    };

    if let Some(path) = &stages_path {
        let overrides = load_stage_overrides(path)?;
        apply_stage_overrides(&mut request, &overrides);
    }

    let config = AnthropicConfig::from_env()?;
    let client = Arc::new(AnthropicClient::new(config));
    let retry = RetryPolicy::default();
    let registry = EvaluatorRegistry::with_llm_judge(client.clone(), retry.clone());

    let result = run_analysis(client, &registry, &definitions, &request, &retry).await;

    write_analysis(&output, &result)?;
    info!("Analysis written to {:?}", output);
    println!("{}", format_analysis_summary(&result));

    if !result.is_complete() {
        anyhow::bail!(
            "analysis failed at stage {}: {}",
            result
                .failed_stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            result.failure.unwrap_or_default()
        );
    }
    Ok(())
}

async fn compare(
    analysis_a: PathBuf,
    analysis_b: PathBuf,
    output: PathBuf,
    judge_model: String,
    criteria: Vec<String>,
) -> Result<()> {
    let a = load_analysis(&analysis_a).context("Failed to load analysis A")?;
    let b = load_analysis(&analysis_b).context("Failed to load analysis B")?;
    info!("Comparing analysis {} (A) with {} (B)", a.id, b.id);

    let criteria: Vec<Criterion> = if criteria.is_empty() {
        vec![
            Criterion::Groundedness,
            Criterion::Faithfulness,
            Criterion::Completeness,
            Criterion::Clarity,
            Criterion::Accuracy,
        ]
    } else {
        criteria
            .iter()
            .map(|name| name.parse().map_err(|e: String| anyhow::anyhow!(e)))
            .collect::<Result<_>>()?
    };

    let config = AnthropicConfig::from_env()?;
    let client = Arc::new(AnthropicClient::new(config));
    let request = ComparisonRequest {
        judge_model,
        criteria,
    };

    let result = run_comparison(client, &a, &b, &request, &RetryPolicy::default()).await?;

    write_comparison(&output, &result)?;
    info!("Comparison written to {:?}", output);
    println!("{}", format_comparison_summary(&result));
    Ok(())
}
