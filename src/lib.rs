pub mod compare;
pub mod eval;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;

pub use compare::{run_comparison, ComparisonError, ComparisonRequest, DEFAULT_JUDGE_MODEL};
pub use eval::{EvaluationError, EvaluationReport, Evaluator, EvaluatorRegistry, LlmJudgeEvaluator};
pub use llm::{
    AnthropicClient, AnthropicConfig, Completion, LlmClient, LlmError, LlmRequest, RetryPolicy,
};
pub use models::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, ComparisonResult, Criterion,
    EvaluationDefinition, EvaluationOutcome, EvaluationRecord, SamplingParams, StageConfig,
    StageKind, TraceRecord, UsageTotals, Winner,
};
pub use stages::{run_analysis, run_stage, StageError, StageOutput};
