use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evaluation::EvaluationRecord;
use super::trace::{SamplingParams, TraceRecord, UsageTotals};

/// The three analysis stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Stage 1: extract the facts stated in the transcript
    Facts,
    /// Stage 2: reason over the facts and transcript
    Insights,
    /// Stage 3: condense everything into a summary
    Summary,
}

impl StageKind {
    /// All stages in execution order
    pub const ALL: [StageKind; 3] = [StageKind::Facts, StageKind::Insights, StageKind::Summary];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Facts => "facts",
            Self::Insights => "insights",
            Self::Summary => "summary",
        }
    }

    /// Stage-specific preset temperature
    pub fn preset_temperature(&self) -> f64 {
        match self {
            Self::Facts => 0.25,
            Self::Insights => 0.65,
            Self::Summary => 0.45,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-stage model and sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Model to invoke for this stage
    pub model: String,
    /// Sampling parameters for this stage
    pub sampling: SamplingParams,
    /// System prompt override; the stage's built-in prompt when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl StageConfig {
    /// Stage preset: stage-specific temperature, shared defaults otherwise
    pub fn preset(kind: StageKind, model: &str) -> Self {
        Self {
            model: model.to_string(),
            sampling: SamplingParams {
                temperature: kind.preset_temperature(),
                ..SamplingParams::default()
            },
            system_prompt: None,
        }
    }
}

/// One analysis request: the transcript plus per-stage configs and the
/// evaluations to fan out after the pipeline completes.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Raw transcript text to analyze
    pub transcript: String,
    /// Optional display title; derived from the transcript when unset
    pub title: Option<String>,
    /// Configuration for stages 1-3, in order
    pub stages: [StageConfig; 3],
    /// Ids of the evaluation definitions to run
    pub evaluation_ids: Vec<String>,
}

impl AnalysisRequest {
    /// Request with all three stage presets on one model
    pub fn new(transcript: impl Into<String>, model: &str) -> Self {
        Self {
            transcript: transcript.into(),
            title: None,
            stages: StageKind::ALL.map(|kind| StageConfig::preset(kind, model)),
            evaluation_ids: Vec::new(),
        }
    }

    pub fn stage_config(&self, kind: StageKind) -> &StageConfig {
        match kind {
            StageKind::Facts => &self.stages[0],
            StageKind::Insights => &self.stages[1],
            StageKind::Summary => &self.stages[2],
        }
    }

    pub fn stage_config_mut(&mut self, kind: StageKind) -> &mut StageConfig {
        match kind {
            StageKind::Facts => &mut self.stages[0],
            StageKind::Insights => &mut self.stages[1],
            StageKind::Summary => &mut self.stages[2],
        }
    }

    /// Title to record: explicit title, else the transcript's first line
    pub fn effective_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        let first_line = self.transcript.lines().next().unwrap_or("").trim();
        if first_line.is_empty() {
            "Untitled analysis".to_string()
        } else {
            let truncated: String = first_line.chars().take(80).collect();
            truncated
        }
    }
}

/// Analysis state machine:
/// pending -> stage1 -> stage2 -> stage3 -> evaluating -> complete | failed.
/// `Complete` means the pipeline succeeded; evaluations may still contain
/// failed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Stage1,
    Stage2,
    Stage3,
    Evaluating,
    Complete,
    Failed,
}

impl AnalysisStatus {
    /// Status while a given stage runs
    pub fn for_stage(kind: StageKind) -> Self {
        match kind {
            StageKind::Facts => Self::Stage1,
            StageKind::Insights => Self::Stage2,
            StageKind::Summary => Self::Stage3,
        }
    }
}

/// Completed (or failed) analysis. Immutable once produced; comparisons
/// reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Fresh id per request; identical inputs still mint a new one
    pub id: Uuid,
    pub title: String,
    /// Terminal state: Complete or Failed
    pub status: AnalysisStatus,
    /// Outputs of the stages that succeeded, retained for audit even on
    /// failure; all three are Some iff the pipeline completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Stage that aborted the pipeline, when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageKind>,
    /// Underlying provider error, when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Every billed invocation, in the order it was made
    pub traces: Vec<TraceRecord>,
    /// One record per requested evaluation; empty when the pipeline failed
    pub evaluations: Vec<EvaluationRecord>,
    /// Totals over all traces (stages, retries, evaluations)
    pub totals: UsageTotals,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn is_complete(&self) -> bool {
        self.status == AnalysisStatus::Complete
    }

    /// Output text of one stage, when present
    pub fn stage_output(&self, kind: StageKind) -> Option<&str> {
        match kind {
            StageKind::Facts => self.facts.as_deref(),
            StageKind::Insights => self.insights.as_deref(),
            StageKind::Summary => self.summary.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_presets() {
        assert_eq!(
            StageKind::ALL,
            [StageKind::Facts, StageKind::Insights, StageKind::Summary]
        );
        assert_eq!(StageKind::Facts.preset_temperature(), 0.25);
        assert_eq!(StageKind::Insights.preset_temperature(), 0.65);
        assert_eq!(StageKind::Summary.preset_temperature(), 0.45);
    }

    #[test]
    fn test_request_presets_apply_stage_temperatures() {
        let request = AnalysisRequest::new("hello", "claude-sonnet-4-20250514");
        assert_eq!(
            request.stage_config(StageKind::Insights).sampling.temperature,
            0.65
        );
        assert_eq!(
            request.stage_config(StageKind::Facts).model,
            "claude-sonnet-4-20250514"
        );
    }

    #[test]
    fn test_effective_title_falls_back_to_first_line() {
        let request = AnalysisRequest::new("Board meeting, Q3\nmore text", "m");
        assert_eq!(request.effective_title(), "Board meeting, Q3");

        let mut titled = AnalysisRequest::new("text", "m");
        titled.title = Some("Custom".to_string());
        assert_eq!(titled.effective_title(), "Custom");

        let empty = AnalysisRequest::new("", "m");
        assert_eq!(empty.effective_title(), "Untitled analysis");
    }

    #[test]
    fn test_status_for_stage() {
        assert_eq!(AnalysisStatus::for_stage(StageKind::Facts), AnalysisStatus::Stage1);
        assert_eq!(AnalysisStatus::for_stage(StageKind::Summary), AnalysisStatus::Stage3);
    }
}
