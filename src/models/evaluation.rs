use serde::{Deserialize, Serialize};

use crate::llm::pricing::is_known_model;

/// Default pass threshold when a definition does not carry its own
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.7;

/// Ownership scope of an evaluation definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationScope {
    /// Visible to one organization only
    Organization,
    /// Shared library definition
    Shared,
}

/// Which evaluator backend runs a definition. Registry key for the
/// orchestrator's evaluator lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    /// Built-in LLM-as-judge backend
    LlmJudge,
}

impl Default for EvaluationSource {
    fn default() -> Self {
        Self::LlmJudge
    }
}

/// A reusable, versioned judge prompt plus model choice.
///
/// Definitions are immutable snapshots: an edit produces a new `version`,
/// never a mutation of a referenced one, so stored outcomes stay
/// reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    /// Stable identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Grouping category (e.g. "faithfulness", "safety")
    pub category: String,
    /// Ownership scope
    pub scope: EvaluationScope,
    /// Evaluator backend that runs this definition
    #[serde(default)]
    pub source: EvaluationSource,
    /// Template for the target's input; may reference {{model_input}}
    pub input_template: String,
    /// Template for the target's output; may reference {{model_output}}
    pub output_template: String,
    /// Template for the judge's system prompt
    pub system_prompt_template: String,
    /// Model that runs the judge call
    pub model: String,
    /// Pass threshold; falls back to [`DEFAULT_PASS_THRESHOLD`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Snapshot version, bumped on edit
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl EvaluationDefinition {
    /// Check the structural invariants: non-empty templates, known model
    pub fn validate(&self) -> Result<(), String> {
        if self.input_template.trim().is_empty() {
            return Err(format!("evaluation {}: input_template is empty", self.id));
        }
        if self.output_template.trim().is_empty() {
            return Err(format!("evaluation {}: output_template is empty", self.id));
        }
        if self.system_prompt_template.trim().is_empty() {
            return Err(format!(
                "evaluation {}: system_prompt_template is empty",
                self.id
            ));
        }
        if !is_known_model(&self.model) {
            return Err(format!(
                "evaluation {}: unknown model id {:?}",
                self.id, self.model
            ));
        }
        if let Some(t) = self.threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!(
                    "evaluation {}: threshold {} outside [0,1]",
                    self.id, t
                ));
            }
        }
        Ok(())
    }

    /// Effective pass threshold for this definition
    pub fn pass_threshold(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_PASS_THRESHOLD)
    }
}

/// Successful result of one evaluation judge call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Definition that produced this outcome
    pub evaluation_id: String,
    pub evaluation_name: String,
    /// Normalized score in [0,1]
    pub score: f64,
    /// Judge verdict when stated, else score >= threshold
    pub passed: bool,
    /// Judge's free-text reasoning
    pub reason: String,
    /// Tokens billed for the judge call
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Billed cost of the judge call in USD
    pub cost_usd: f64,
    /// Judge call duration
    pub duration_ms: u64,
}

/// Per-definition entry in an analysis result. Failures are isolated data,
/// not errors: one failed evaluation never fails the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationRecord {
    Completed(EvaluationOutcome),
    Failed {
        evaluation_id: String,
        evaluation_name: String,
        /// What went wrong (provider error or unparseable judge response)
        error: String,
    },
}

impl EvaluationRecord {
    pub fn evaluation_id(&self) -> &str {
        match self {
            Self::Completed(outcome) => &outcome.evaluation_id,
            Self::Failed { evaluation_id, .. } => evaluation_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn definition(id: &str) -> EvaluationDefinition {
        EvaluationDefinition {
            id: id.to_string(),
            name: format!("{id} check"),
            category: "faithfulness".to_string(),
            scope: EvaluationScope::Shared,
            source: EvaluationSource::LlmJudge,
            input_template: "Input: {{model_input}}".to_string(),
            output_template: "Output: {{model_output}}".to_string(),
            system_prompt_template: "Score faithfulness of {{model_output}} given {{model_input}} from 0 to 1.".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            threshold: None,
            version: 1,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(definition("faith").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_template() {
        let mut def = definition("faith");
        def.output_template = "  ".to_string();
        assert!(def.validate().unwrap_err().contains("output_template"));
    }

    #[test]
    fn test_validate_rejects_unknown_model() {
        let mut def = definition("faith");
        def.model = "gpt-unknown".to_string();
        assert!(def.validate().unwrap_err().contains("unknown model"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut def = definition("faith");
        def.threshold = Some(1.5);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_pass_threshold_default() {
        assert_eq!(definition("faith").pass_threshold(), DEFAULT_PASS_THRESHOLD);
        let mut def = definition("faith");
        def.threshold = Some(0.9);
        assert_eq!(def.pass_threshold(), 0.9);
    }

    #[test]
    fn test_record_status_tag_serialization() {
        let record = EvaluationRecord::Failed {
            evaluation_id: "faith".to_string(),
            evaluation_name: "faith check".to_string(),
            error: "judge response unparseable".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["evaluation_id"], "faith");
    }
}
