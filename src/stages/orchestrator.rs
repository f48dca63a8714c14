use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::eval::EvaluatorRegistry;
use crate::llm::{LlmClient, RetryPolicy};
use crate::models::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, EvaluationDefinition, EvaluationRecord,
    StageKind, TraceRecord, UsageTotals,
};

use super::runner::run_stage;

/// Drive one analysis to a terminal state: three strictly sequential
/// pipeline stages, then a concurrent evaluation fan-out joined before
/// the result is assembled.
///
/// A stage failure aborts the pipeline and yields a `failed` result with
/// the traces billed so far; evaluation failures are isolated records and
/// never fail the analysis. Dropping the returned future cancels any
/// outstanding evaluation tasks.
pub async fn run_analysis(
    client: Arc<dyn LlmClient>,
    registry: &EvaluatorRegistry,
    definitions: &[EvaluationDefinition],
    request: &AnalysisRequest,
    retry: &RetryPolicy,
) -> AnalysisResult {
    let id = Uuid::new_v4();
    let title = request.effective_title();
    info!(analysis = %id, title = %title, "starting analysis");

    let mut traces: Vec<TraceRecord> = Vec::new();
    let mut outputs: Vec<(StageKind, String)> = Vec::new();

    // Stages run in order; each prompt embeds all prior outputs
    for kind in StageKind::ALL {
        info!(analysis = %id, status = ?AnalysisStatus::for_stage(kind), "entering stage");
        match run_stage(
            client.as_ref(),
            kind,
            &request.transcript,
            &outputs,
            request.stage_config(kind),
            retry,
        )
        .await
        {
            Ok(stage_output) => {
                traces.extend(stage_output.traces);
                outputs.push((kind, stage_output.text));
            }
            Err(error) => {
                warn!(analysis = %id, stage = %kind, "pipeline aborted: {error}");
                traces.extend(error.traces);
                let totals = UsageTotals::from_traces(&traces);
                // No evaluation ever runs against an incomplete pipeline
                return AnalysisResult {
                    id,
                    title,
                    status: AnalysisStatus::Failed,
                    facts: stage_output_text(&outputs, StageKind::Facts),
                    insights: stage_output_text(&outputs, StageKind::Insights),
                    summary: stage_output_text(&outputs, StageKind::Summary),
                    failed_stage: Some(kind),
                    failure: Some(error.source.to_string()),
                    traces,
                    evaluations: Vec::new(),
                    totals,
                    created_at: Utc::now(),
                };
            }
        }
    }

    let summary = stage_output_text(&outputs, StageKind::Summary).unwrap_or_default();

    info!(
        analysis = %id,
        count = request.evaluation_ids.len(),
        "entering evaluating"
    );

    // Fan-out: one task per selected definition, joined before assembly.
    // Records land in request order regardless of completion order.
    let mut records: Vec<Option<EvaluationRecord>> =
        request.evaluation_ids.iter().map(|_| None).collect();
    let mut join_set = JoinSet::new();

    for (idx, evaluation_id) in request.evaluation_ids.iter().enumerate() {
        let Some(definition) = definitions.iter().find(|d| d.id == *evaluation_id) else {
            records[idx] = Some(EvaluationRecord::Failed {
                evaluation_id: evaluation_id.clone(),
                evaluation_name: evaluation_id.clone(),
                error: "unknown evaluation definition".to_string(),
            });
            continue;
        };
        let Some(evaluator) = registry.get(definition.source) else {
            records[idx] = Some(EvaluationRecord::Failed {
                evaluation_id: definition.id.clone(),
                evaluation_name: definition.name.clone(),
                error: format!("no evaluator registered for source {:?}", definition.source),
            });
            continue;
        };

        let definition = definition.clone();
        let transcript = request.transcript.clone();
        let summary = summary.clone();
        join_set.spawn(async move {
            let report = evaluator.evaluate(&definition, &transcript, &summary).await;
            (idx, report)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, report)) => {
                traces.extend(report.traces);
                records[idx] = Some(report.record);
            }
            Err(join_error) => {
                warn!(analysis = %id, "evaluation task did not complete: {join_error}");
            }
        }
    }

    // Every requested evaluation gets a record, even if its task vanished
    let evaluations: Vec<EvaluationRecord> = records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            record.unwrap_or_else(|| EvaluationRecord::Failed {
                evaluation_id: request.evaluation_ids[idx].clone(),
                evaluation_name: request.evaluation_ids[idx].clone(),
                error: "evaluation task aborted".to_string(),
            })
        })
        .collect();

    let totals = UsageTotals::from_traces(&traces);
    let completed = evaluations.iter().filter(|r| r.is_completed()).count();
    info!(
        analysis = %id,
        evaluations_completed = completed,
        evaluations_failed = evaluations.len() - completed,
        cost_usd = totals.cost_usd,
        "analysis complete"
    );

    AnalysisResult {
        id,
        title,
        status: AnalysisStatus::Complete,
        facts: stage_output_text(&outputs, StageKind::Facts),
        insights: stage_output_text(&outputs, StageKind::Insights),
        summary: Some(summary),
        failed_stage: None,
        failure: None,
        traces,
        evaluations,
        totals,
        created_at: Utc::now(),
    }
}

fn stage_output_text(outputs: &[(StageKind, String)], kind: StageKind) -> Option<String> {
    outputs
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, text)| text.clone())
}
