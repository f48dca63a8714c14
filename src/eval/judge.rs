use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::prompts::build_judge_prompt;
use crate::llm::template::{render, standard_variables};
use crate::llm::{invoke_with_retry, LlmClient, LlmRequest, RetryPolicy};
use crate::models::{
    EvaluationDefinition, EvaluationOutcome, EvaluationRecord, EvaluationSource, SamplingParams,
};

use super::parse::parse_judge_response;
use super::{EvaluationError, EvaluationReport, Evaluator};

/// Judge calls are deterministic and short
const JUDGE_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.0,
    top_p: 1.0,
    max_tokens: 1024,
};

/// Built-in LLM-as-judge evaluation backend: render the definition's
/// templates, run one (retried) judge call, strict-parse the response.
pub struct LlmJudgeEvaluator {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
}

impl LlmJudgeEvaluator {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl Evaluator for LlmJudgeEvaluator {
    fn source(&self) -> EvaluationSource {
        EvaluationSource::LlmJudge
    }

    async fn evaluate(
        &self,
        definition: &EvaluationDefinition,
        model_input: &str,
        model_output: &str,
    ) -> EvaluationReport {
        if let Err(problem) = definition.validate() {
            // Nothing was billed; fail before any call
            return EvaluationReport {
                record: failed(definition, &EvaluationError::InvalidDefinition(problem)),
                traces: Vec::new(),
            };
        }

        let variables = standard_variables(model_input, model_output);
        let rendered_input = render(&definition.input_template, &variables);
        let rendered_output = render(&definition.output_template, &variables);
        let system_prompt = render(&definition.system_prompt_template, &variables);

        let request = LlmRequest {
            label: format!("eval:{}", definition.id),
            model: definition.model.clone(),
            system_prompt: Some(system_prompt),
            user_prompt: build_judge_prompt(&rendered_input, &rendered_output),
            sampling: JUDGE_SAMPLING,
        };

        debug!(evaluation = %definition.id, model = %definition.model, "dispatching judge call");
        let outcome = invoke_with_retry(self.client.as_ref(), &request, &self.retry).await;
        let traces = outcome.all_traces();

        let record = match outcome.result {
            Ok(completion) => match parse_judge_response(&completion.text) {
                Ok(judgement) => {
                    // Judge verdict wins; threshold decides when absent
                    let passed = judgement
                        .verdict
                        .unwrap_or(judgement.score >= definition.pass_threshold());
                    EvaluationRecord::Completed(EvaluationOutcome {
                        evaluation_id: definition.id.clone(),
                        evaluation_name: definition.name.clone(),
                        score: judgement.score,
                        passed,
                        reason: judgement.reason,
                        input_tokens: completion.trace.input_tokens,
                        output_tokens: completion.trace.output_tokens,
                        cost_usd: completion.trace.cost_usd,
                        duration_ms: completion.trace.duration_ms,
                    })
                }
                Err(parse_error) => {
                    warn!(evaluation = %definition.id, "judge response unparseable: {parse_error}");
                    failed(definition, &EvaluationError::Unparseable(parse_error))
                }
            },
            Err(llm_error) => {
                warn!(evaluation = %definition.id, "judge call failed: {llm_error}");
                failed(definition, &EvaluationError::Provider(llm_error))
            }
        };

        EvaluationReport { record, traces }
    }
}

fn failed(definition: &EvaluationDefinition, error: &EvaluationError) -> EvaluationRecord {
    EvaluationRecord::Failed {
        evaluation_id: definition.id.clone(),
        evaluation_name: definition.name.clone(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockClient;
    use crate::models::{EvaluationScope, EvaluationRecord};

    fn definition() -> EvaluationDefinition {
        EvaluationDefinition {
            id: "faithfulness".to_string(),
            name: "Faithfulness".to_string(),
            category: "quality".to_string(),
            scope: EvaluationScope::Shared,
            source: EvaluationSource::LlmJudge,
            input_template: "Input: {{model_input}}".to_string(),
            output_template: "Output: {{model_output}}".to_string(),
            system_prompt_template:
                "Score faithfulness of {{model_output}} given {{model_input}} from 0 to 1."
                    .to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            threshold: None,
            version: 1,
        }
    }

    fn evaluator(client: Arc<MockClient>) -> LlmJudgeEvaluator {
        LlmJudgeEvaluator::new(client, RetryPolicy::immediate(0))
    }

    #[tokio::test]
    async fn test_low_score_fails_threshold() {
        let client = Arc::new(MockClient::script(vec![MockClient::ok(
            "SCORE: 0.1\nREASON: output contradicts the input",
        )]));
        let report = evaluator(client.clone())
            .evaluate(
                &definition(),
                "Paris is the capital of France.",
                "Paris is the capital of Germany.",
            )
            .await;

        let EvaluationRecord::Completed(outcome) = report.record else {
            panic!("expected completed record");
        };
        assert!(outcome.score <= 0.2);
        assert!(!outcome.passed);
        assert_eq!(outcome.reason, "output contradicts the input");
        assert_eq!(report.traces.len(), 1);

        // The rendered system prompt carries both bound variables
        let call = &client.calls()[0];
        let system = call.system_prompt.as_deref().unwrap();
        assert!(system.contains("Paris is the capital of Germany."));
        assert!(system.contains("Paris is the capital of France."));
    }

    #[tokio::test]
    async fn test_verdict_takes_precedence_over_threshold() {
        let client = Arc::new(MockClient::script(vec![MockClient::ok(
            "SCORE: 0.2\nVERDICT: pass\nREASON: low score but acceptable",
        )]));
        let report = evaluator(client)
            .evaluate(&definition(), "in", "out")
            .await;
        let EvaluationRecord::Completed(outcome) = report.record else {
            panic!("expected completed record");
        };
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn test_threshold_decides_when_verdict_absent() {
        let mut def = definition();
        def.threshold = Some(0.5);
        let client = Arc::new(MockClient::script(vec![MockClient::ok(
            "SCORE: 0.6\nREASON: mostly faithful",
        )]));
        let report = evaluator(client).evaluate(&def, "in", "out").await;
        let EvaluationRecord::Completed(outcome) = report.record else {
            panic!("expected completed record");
        };
        assert!(outcome.passed);
        assert!((0.0..=1.0).contains(&outcome.score));
    }

    #[tokio::test]
    async fn test_unparseable_response_is_failed_but_billed() {
        let client = Arc::new(MockClient::script(vec![MockClient::ok_costing(
            "The answer seems fine to me.",
            0.002,
        )]));
        let report = evaluator(client)
            .evaluate(&definition(), "in", "out")
            .await;
        assert!(matches!(report.record, EvaluationRecord::Failed { .. }));
        // The call was billed; its trace survives
        assert_eq!(report.traces.len(), 1);
        assert!((report.traces[0].cost_usd - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_provider_failure_is_failed_record() {
        let client = Arc::new(MockClient::script(vec![MockClient::rejected("quota")]));
        let report = evaluator(client)
            .evaluate(&definition(), "in", "out")
            .await;
        let EvaluationRecord::Failed { error, .. } = report.record else {
            panic!("expected failed record");
        };
        assert!(error.contains("quota"));
        assert_eq!(report.traces.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_definition_makes_no_call() {
        let mut def = definition();
        def.system_prompt_template = String::new();
        let client = Arc::new(MockClient::script(vec![MockClient::ok("unused")]));
        let report = evaluator(client.clone()).evaluate(&def, "in", "out").await;
        assert!(matches!(report.record, EvaluationRecord::Failed { .. }));
        assert!(report.traces.is_empty());
        assert!(client.calls().is_empty());
    }
}
