use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::prompts::{build_comparison_prompt, build_comparison_system_prompt};
use crate::llm::{invoke_with_retry, LlmClient, LlmRequest, RetryPolicy};
use crate::models::{
    overall_winner, AnalysisResult, ComparisonResult, CriterionScores, SamplingParams,
    StageComparison, StageKind, TraceRecord, UsageTotals, Winner,
};

use super::parse::parse_comparison_response;
use super::{ComparisonError, ComparisonRequest};

/// Comparison judge calls are deterministic and short
const JUDGE_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.0,
    top_p: 1.0,
    max_tokens: 2048,
};

/// Compare two completed analyses: one judge call per pipeline stage, all
/// three in parallel, joined before the verdict is assembled.
///
/// Preconditions are checked before any judge call is dispatched, so a
/// doomed comparison never incurs judge cost. Any stage judge failure
/// (provider error after retries, or a grammar violation) fails the whole
/// comparison; a result is never emitted with fewer than three stages.
pub async fn run_comparison(
    client: Arc<dyn LlmClient>,
    a: &AnalysisResult,
    b: &AnalysisResult,
    request: &ComparisonRequest,
    retry: &RetryPolicy,
) -> Result<ComparisonResult, ComparisonError> {
    validate_inputs(a, b, request)?;

    let id = Uuid::new_v4();
    info!(comparison = %id, a = %a.id, b = %b.id, "judging comparison");

    let system_prompt = build_comparison_system_prompt(&request.criteria);
    let mut join_set = JoinSet::new();

    for stage in StageKind::ALL {
        // Outputs exist: both analyses are complete (validated above)
        let output_a = a.stage_output(stage).unwrap_or_default().to_string();
        let output_b = b.stage_output(stage).unwrap_or_default().to_string();
        let llm_request = LlmRequest {
            label: format!("judge:{}", stage.label()),
            model: request.judge_model.clone(),
            system_prompt: Some(system_prompt.clone()),
            user_prompt: build_comparison_prompt(stage, &output_a, &output_b),
            sampling: JUDGE_SAMPLING,
        };
        let client = client.clone();
        let criteria = request.criteria.clone();
        let retry = retry.clone();
        join_set.spawn(async move {
            let outcome = invoke_with_retry(client.as_ref(), &llm_request, &retry).await;
            let traces = outcome.all_traces();
            let parsed = match outcome.result {
                Ok(completion) => {
                    parse_comparison_response(&completion.text, &criteria)
                        .map_err(|e| e.to_string())
                }
                Err(llm_error) => Err(llm_error.to_string()),
            };
            (stage, parsed, traces)
        });
    }

    let mut judge_traces: Vec<TraceRecord> = Vec::new();
    let mut parsed_stages: Vec<(StageKind, Result<(Vec<CriterionScores>, String), String>)> =
        Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((stage, parsed, traces)) => {
                judge_traces.extend(traces);
                parsed_stages.push((stage, parsed));
            }
            Err(join_error) => {
                // The aborted stage is simply absent from parsed_stages;
                // the assembly loop below attributes it by its own kind
                warn!(comparison = %id, "judge task did not complete: {join_error}");
            }
        }
    }

    let judge_usage = UsageTotals::from_traces(&judge_traces);

    // Assemble in stage order; the first failed stage fails the comparison
    let mut stages: Vec<StageComparison> = Vec::with_capacity(3);
    for stage in StageKind::ALL {
        let parsed = parsed_stages
            .iter()
            .find(|(k, _)| *k == stage)
            .map(|(_, parsed)| parsed)
            .cloned()
            .unwrap_or_else(|| Err("missing stage judge result".to_string()));
        match parsed {
            Ok((scores, reasoning)) => {
                let winner = StageComparison::derive_winner(&scores);
                stages.push(StageComparison {
                    stage,
                    scores,
                    winner,
                    reasoning,
                });
            }
            Err(detail) => {
                warn!(
                    comparison = %id,
                    stage = %stage,
                    billed_cost_usd = judge_usage.cost_usd,
                    "comparison failed: {detail}"
                );
                return Err(ComparisonError::StageJudgeFailed {
                    stage,
                    detail,
                    judge_usage,
                });
            }
        }
    }

    let stage_winners: Vec<Winner> = stages.iter().map(|s| s.winner).collect();
    let winner = overall_winner(&stage_winners);
    let overall_reasoning = compose_overall_reasoning(&stages, winner);

    let quality_delta = mean_score_delta(&stages);
    let cost_delta_usd = b.totals.cost_usd - a.totals.cost_usd;

    info!(
        comparison = %id,
        winner = ?winner,
        quality_delta,
        cost_delta_usd,
        judge_cost_usd = judge_usage.cost_usd,
        "comparison complete"
    );

    Ok(ComparisonResult {
        id,
        analysis_a: a.id,
        analysis_b: b.id,
        judge_model: request.judge_model.clone(),
        criteria: request.criteria.clone(),
        stages,
        overall_winner: winner,
        overall_reasoning,
        judge_usage,
        cost_delta_usd,
        quality_delta,
        created_at: Utc::now(),
    })
}

/// Fail fast before any judge call is made
fn validate_inputs(
    a: &AnalysisResult,
    b: &AnalysisResult,
    request: &ComparisonRequest,
) -> Result<(), ComparisonError> {
    if request.criteria.is_empty() {
        return Err(ComparisonError::InvalidComparisonInput(
            "criteria selection is empty".to_string(),
        ));
    }
    if a.id == b.id {
        return Err(ComparisonError::InvalidComparisonInput(format!(
            "cannot compare analysis {} with itself",
            a.id
        )));
    }
    for analysis in [a, b] {
        if !analysis.is_complete() {
            return Err(ComparisonError::InvalidComparisonInput(format!(
                "analysis {} is {:?}, not complete",
                analysis.id, analysis.status
            )));
        }
    }
    Ok(())
}

/// Mean (score_b - score_a) over every criterion of every stage
fn mean_score_delta(stages: &[StageComparison]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for stage in stages {
        for score in &stage.scores {
            sum += score.score_b - score.score_a;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn compose_overall_reasoning(stages: &[StageComparison], winner: Winner) -> String {
    let describe = |side: Winner| -> String {
        let won: Vec<&str> = stages
            .iter()
            .filter(|s| s.winner == side)
            .map(|s| s.stage.label())
            .collect();
        if won.is_empty() {
            "no stages".to_string()
        } else {
            won.join(", ")
        }
    };
    let verdict = match winner {
        Winner::A => "Overall winner: A.",
        Winner::B => "Overall winner: B.",
        Winner::Tie => "Overall: tie.",
    };
    format!(
        "{verdict} A won: {}. B won: {}. Ties: {}.",
        describe(Winner::A),
        describe(Winner::B),
        stages.iter().filter(|s| s.winner == Winner::Tie).count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockClient;
    use crate::models::{AnalysisStatus, Criterion};

    fn completed(cost: f64) -> AnalysisResult {
        AnalysisResult {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            status: AnalysisStatus::Complete,
            facts: Some("A-facts".to_string()),
            insights: Some("A-insights".to_string()),
            summary: Some("A-summary".to_string()),
            failed_stage: None,
            failure: None,
            traces: Vec::new(),
            evaluations: Vec::new(),
            totals: UsageTotals {
                input_tokens: 100,
                output_tokens: 50,
                cost_usd: cost,
            },
            created_at: Utc::now(),
        }
    }

    fn request(criteria: Vec<Criterion>) -> ComparisonRequest {
        ComparisonRequest {
            judge_model: "claude-sonnet-4-20250514".to_string(),
            criteria,
        }
    }

    fn stage_reply(score_a: f64, score_b: f64) -> String {
        format!("CRITERION: accuracy\nSCORE_A: {score_a}\nSCORE_B: {score_b}\nREASONING: judged")
    }

    async fn compare(
        client: Arc<MockClient>,
        a: &AnalysisResult,
        b: &AnalysisResult,
        request: &ComparisonRequest,
    ) -> Result<ComparisonResult, ComparisonError> {
        run_comparison(client, a, b, request, &RetryPolicy::immediate(0)).await
    }

    #[tokio::test]
    async fn test_overall_winner_is_stage_majority() {
        // A wins facts and summary, B wins insights: [A, B, A] -> A
        let client = Arc::new(MockClient::with_label_scripts(vec![
            ("judge:facts", vec![MockClient::ok(&stage_reply(0.9, 0.6))]),
            ("judge:insights", vec![MockClient::ok(&stage_reply(0.3, 0.8))]),
            ("judge:summary", vec![MockClient::ok(&stage_reply(0.7, 0.5))]),
        ]));
        let a = completed(0.05);
        let b = completed(0.08);
        let result = compare(client, &a, &b, &request(vec![Criterion::Accuracy]))
            .await
            .unwrap();

        assert_eq!(result.overall_winner, Winner::A);
        assert_eq!(result.stages.len(), 3);
        assert_eq!(result.stages[0].stage, StageKind::Facts);
        assert_eq!(result.stages[0].winner, Winner::A);
        assert_eq!(result.stages[1].winner, Winner::B);
        assert!((result.cost_delta_usd - 0.03).abs() < 1e-9);
        // Mean of (0.6-0.9), (0.8-0.3), (0.5-0.7)
        assert!((result.quality_delta - 0.0).abs() < 1e-9);
        // Three billed judge calls aggregated
        assert!((result.judge_usage.cost_usd - 0.003).abs() < 1e-9);
        assert!(result.overall_reasoning.contains("Overall winner: A."));
    }

    #[tokio::test]
    async fn test_empty_criteria_fails_before_any_call() {
        let client = Arc::new(MockClient::script(vec![]));
        let a = completed(0.01);
        let b = completed(0.01);
        let err = compare(client.clone(), &a, &b, &request(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidComparisonInput(_)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_analysis_fails_before_any_call() {
        let client = Arc::new(MockClient::script(vec![]));
        let a = completed(0.01);
        let mut b = completed(0.01);
        b.status = AnalysisStatus::Failed;
        let err = compare(client.clone(), &a, &b, &request(vec![Criterion::Accuracy]))
            .await
            .unwrap_err();
        let ComparisonError::InvalidComparisonInput(detail) = err else {
            panic!("expected invalid input");
        };
        assert!(detail.contains("not complete"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_self_comparison_rejected() {
        let client = Arc::new(MockClient::script(vec![]));
        let a = completed(0.01);
        let err = compare(client, &a, &a, &request(vec![Criterion::Accuracy]))
            .await
            .unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidComparisonInput(_)));
    }

    #[tokio::test]
    async fn test_one_failed_stage_judge_fails_the_comparison() {
        let client = Arc::new(MockClient::with_label_scripts(vec![
            ("judge:facts", vec![MockClient::ok(&stage_reply(0.9, 0.6))]),
            ("judge:insights", vec![MockClient::ok("not the grammar")]),
            ("judge:summary", vec![MockClient::ok(&stage_reply(0.7, 0.5))]),
        ]));
        let a = completed(0.01);
        let b = completed(0.01);
        let err = compare(client, &a, &b, &request(vec![Criterion::Accuracy]))
            .await
            .unwrap_err();
        let ComparisonError::StageJudgeFailed {
            stage,
            detail,
            judge_usage,
        } = err
        else {
            panic!("expected stage judge failure");
        };
        assert_eq!(stage, StageKind::Insights);
        assert!(!detail.is_empty());
        // All three judge calls were billed before the grammar violation
        // surfaced; the error reports that spend
        assert!((judge_usage.cost_usd - 0.003).abs() < 1e-9);
        assert_eq!(judge_usage.total_tokens(), 3 * 140);
    }

    /// Insights judge calls panic; the other stages answer normally.
    struct AbortingInsightsClient;

    #[async_trait::async_trait]
    impl LlmClient for AbortingInsightsClient {
        async fn invoke(
            &self,
            request: &LlmRequest,
        ) -> Result<crate::llm::Completion, crate::llm::LlmError> {
            if request.label == "judge:insights" {
                panic!("judge call blew up");
            }
            Ok(crate::llm::Completion {
                text: stage_reply(0.8, 0.4),
                trace: TraceRecord {
                    label: request.label.clone(),
                    model: request.model.clone(),
                    sampling: request.sampling,
                    input_tokens: 100,
                    output_tokens: 40,
                    cost_usd: 0.001,
                    duration_ms: 5,
                    succeeded: true,
                    system_prompt: request.system_prompt.clone(),
                    created_at: Utc::now(),
                },
            })
        }
    }

    #[tokio::test]
    async fn test_aborted_judge_task_is_attributed_to_its_own_stage() {
        let a = completed(0.01);
        let b = completed(0.01);
        let err = run_comparison(
            Arc::new(AbortingInsightsClient),
            &a,
            &b,
            &request(vec![Criterion::Accuracy]),
            &RetryPolicy::immediate(0),
        )
        .await
        .unwrap_err();
        let ComparisonError::StageJudgeFailed {
            stage, judge_usage, ..
        } = err
        else {
            panic!("expected stage judge failure");
        };
        assert_eq!(stage, StageKind::Insights);
        // The two stages that did answer stay billed
        assert!((judge_usage.cost_usd - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_judge_prompts_embed_both_outputs() {
        let client = Arc::new(MockClient::with_label_scripts(vec![
            ("judge:facts", vec![MockClient::ok(&stage_reply(0.5, 0.5))]),
            ("judge:insights", vec![MockClient::ok(&stage_reply(0.5, 0.5))]),
            ("judge:summary", vec![MockClient::ok(&stage_reply(0.5, 0.5))]),
        ]));
        let a = completed(0.01);
        let mut b = completed(0.01);
        b.facts = Some("B-facts".to_string());
        let result = compare(client.clone(), &a, &b, &request(vec![Criterion::Accuracy]))
            .await
            .unwrap();
        assert_eq!(result.overall_winner, Winner::Tie);

        let calls = client.calls();
        let facts_call = calls.iter().find(|c| c.label == "judge:facts").unwrap();
        assert!(facts_call.user_prompt.contains("A-facts"));
        assert!(facts_call.user_prompt.contains("B-facts"));
        // System prompt embeds the criteria rubric
        assert!(facts_call
            .system_prompt
            .as_deref()
            .unwrap()
            .contains("- accuracy:"));
    }
}
