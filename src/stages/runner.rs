use thiserror::Error;
use tracing::info;

use crate::llm::prompts::{build_stage_prompt, default_stage_system_prompt};
use crate::llm::{invoke_with_retry, LlmClient, LlmError, LlmRequest, RetryPolicy};
use crate::models::{StageConfig, StageKind, TraceRecord};

/// A stage failure after retries. Fatal to the enclosing analysis; the
/// billed attempt traces ride along so no cost is lost.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {source}")]
pub struct StageError {
    pub stage: StageKind,
    #[source]
    pub source: LlmError,
    /// Every billed attempt of this stage
    pub traces: Vec<TraceRecord>,
}

/// Output of one completed stage
#[derive(Debug)]
pub struct StageOutput {
    pub text: String,
    /// Billed attempts, failed retries first, success last
    pub traces: Vec<TraceRecord>,
}

/// Run one pipeline stage. Stage n's prompt embeds the literal output
/// text of every stage before it, alongside the original transcript.
pub async fn run_stage(
    client: &dyn LlmClient,
    kind: StageKind,
    transcript: &str,
    prior_outputs: &[(StageKind, String)],
    config: &StageConfig,
    retry: &RetryPolicy,
) -> Result<StageOutput, StageError> {
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| default_stage_system_prompt(kind).to_string());

    let request = LlmRequest {
        label: format!("stage:{}", kind.label()),
        model: config.model.clone(),
        system_prompt: Some(system_prompt),
        user_prompt: build_stage_prompt(kind, transcript, prior_outputs),
        sampling: config.sampling,
    };

    info!(stage = %kind, model = %config.model, "running stage");
    let outcome = invoke_with_retry(client, &request, retry).await;
    let traces = outcome.all_traces();

    match outcome.result {
        Ok(completion) => {
            info!(
                stage = %kind,
                tokens = completion.trace.input_tokens + completion.trace.output_tokens,
                duration_ms = completion.trace.duration_ms,
                "stage complete"
            );
            Ok(StageOutput {
                text: completion.text,
                traces,
            })
        }
        Err(source) => Err(StageError {
            stage: kind,
            source,
            traces,
        }),
    }
}
