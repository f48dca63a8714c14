pub mod judge;
pub mod parse;

pub use judge::LlmJudgeEvaluator;
pub use parse::{parse_judge_response, JudgeParseError, ParsedJudgement};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{LlmClient, LlmError, RetryPolicy};
use crate::models::{EvaluationDefinition, EvaluationRecord, EvaluationSource, TraceRecord};

/// Why one evaluation produced no outcome. Isolated per evaluation: it
/// never fails the enclosing analysis.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("judge call failed: {0}")]
    Provider(#[from] LlmError),
    #[error("judge response unparseable: {0}")]
    Unparseable(#[from] JudgeParseError),
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),
}

/// What one evaluation run produced: the record (completed or failed) plus
/// every billed attempt's trace. Billed failures are never dropped.
#[derive(Debug)]
pub struct EvaluationReport {
    pub record: EvaluationRecord,
    pub traces: Vec<TraceRecord>,
}

/// Vendor boundary: any evaluation backend implements this and nothing
/// else. The orchestrator never inspects a backend's internals.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Registry key this backend serves
    fn source(&self) -> EvaluationSource;

    /// Run one definition against a target's input/output pair
    async fn evaluate(
        &self,
        definition: &EvaluationDefinition,
        model_input: &str,
        model_output: &str,
    ) -> EvaluationReport;
}

/// Evaluator backends keyed by evaluation source
#[derive(Default)]
pub struct EvaluatorRegistry {
    backends: HashMap<EvaluationSource, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in LLM-judge backend
    pub fn with_llm_judge(client: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LlmJudgeEvaluator::new(client, retry)));
        registry
    }

    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.backends.insert(evaluator.source(), evaluator);
    }

    pub fn get(&self, source: EvaluationSource) -> Option<Arc<dyn Evaluator>> {
        self.backends.get(&source).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockClient;

    #[test]
    fn test_registry_lookup() {
        let client = Arc::new(MockClient::script(vec![]));
        let registry = EvaluatorRegistry::with_llm_judge(client, RetryPolicy::immediate(0));
        assert!(registry.get(EvaluationSource::LlmJudge).is_some());
    }

    #[test]
    fn test_empty_registry_has_no_backends() {
        assert!(EvaluatorRegistry::new()
            .get(EvaluationSource::LlmJudge)
            .is_none());
    }
}
