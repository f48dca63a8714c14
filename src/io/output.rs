use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{AnalysisResult, AnalysisStatus, ComparisonResult, EvaluationRecord};

/// Write an analysis result as pretty-printed JSON
pub fn write_analysis(path: &Path, result: &AnalysisResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize analysis")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write analysis to {path:?}"))
}

/// Write a comparison result as pretty-printed JSON
pub fn write_comparison(path: &Path, result: &ComparisonResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize comparison")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write comparison to {path:?}"))
}

/// Human-readable one-screen summary of an analysis
pub fn format_analysis_summary(result: &AnalysisResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Analysis {}: {}\n", result.id, result.title));
    out.push_str(&format!("Status: {:?}\n", result.status));
    if result.status == AnalysisStatus::Failed {
        if let (Some(stage), Some(failure)) = (&result.failed_stage, &result.failure) {
            out.push_str(&format!("Failed at stage {stage}: {failure}\n"));
        }
    }
    let completed = result
        .evaluations
        .iter()
        .filter(|r| r.is_completed())
        .count();
    out.push_str(&format!(
        "Evaluations: {completed} completed, {} failed\n",
        result.evaluations.len() - completed
    ));
    for record in &result.evaluations {
        match record {
            EvaluationRecord::Completed(outcome) => {
                out.push_str(&format!(
                    "  {}: score {:.2}, {}\n",
                    outcome.evaluation_name,
                    outcome.score,
                    if outcome.passed { "passed" } else { "failed" }
                ));
            }
            EvaluationRecord::Failed {
                evaluation_name,
                error,
                ..
            } => {
                out.push_str(&format!("  {evaluation_name}: error: {error}\n"));
            }
        }
    }
    out.push_str(&format!(
        "Tokens: {} in / {} out, cost ${:.4} over {} calls\n",
        result.totals.input_tokens,
        result.totals.output_tokens,
        result.totals.cost_usd,
        result.traces.len()
    ));
    out
}

/// Human-readable one-screen summary of a comparison
pub fn format_comparison_summary(result: &ComparisonResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Comparison {}: A {} vs B {}\n",
        result.id, result.analysis_a, result.analysis_b
    ));
    for stage in &result.stages {
        out.push_str(&format!("  {}: winner {:?}\n", stage.stage, stage.winner));
    }
    out.push_str(&format!(
        "Overall: {:?} (quality delta {:+.3}, cost delta ${:+.4})\n",
        result.overall_winner, result.quality_delta, result.cost_delta_usd
    ));
    out.push_str(&format!(
        "Judge cost: ${:.4} over {} tokens\n",
        result.judge_usage.cost_usd,
        result.judge_usage.total_tokens()
    ));
    out
}
