use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{AnalysisRequest, AnalysisResult, EvaluationDefinition, StageKind};

/// Read the raw transcript text to analyze
pub fn read_transcript(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript from {path:?}"))
}

/// Load evaluation definitions from a JSON array file. Every definition
/// must satisfy its structural invariants.
pub fn load_definitions(path: &Path) -> Result<Vec<EvaluationDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definitions from {path:?}"))?;
    let definitions: Vec<EvaluationDefinition> =
        serde_json::from_str(&raw).context("Failed to parse definitions JSON")?;
    for definition in &definitions {
        definition
            .validate()
            .map_err(|problem| anyhow::anyhow!("Invalid evaluation definition: {problem}"))?;
    }
    Ok(definitions)
}

/// Load a stored analysis result (for comparison input)
pub fn load_analysis(path: &Path) -> Result<AnalysisResult> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read analysis from {path:?}"))?;
    serde_json::from_str(&raw).context("Failed to parse analysis JSON")
}

/// Optional per-stage overrides, loaded from a JSON file. Unset fields
/// keep the stage preset.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StageOverrides {
    #[serde(default)]
    pub facts: Option<StageOverride>,
    #[serde(default)]
    pub insights: Option<StageOverride>,
    #[serde(default)]
    pub summary: Option<StageOverride>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct StageOverride {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Load stage overrides from a JSON file
pub fn load_stage_overrides(path: &Path) -> Result<StageOverrides> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stage overrides from {path:?}"))?;
    serde_json::from_str(&raw).context("Failed to parse stage overrides JSON")
}

/// Apply overrides on top of the request's stage presets
pub fn apply_stage_overrides(request: &mut AnalysisRequest, overrides: &StageOverrides) {
    let pairs = [
        (StageKind::Facts, &overrides.facts),
        (StageKind::Insights, &overrides.insights),
        (StageKind::Summary, &overrides.summary),
    ];
    for (kind, stage_override) in pairs {
        let Some(stage_override) = stage_override else {
            continue;
        };
        let config = request.stage_config_mut(kind);
        if let Some(model) = &stage_override.model {
            config.model = model.clone();
        }
        if let Some(temperature) = stage_override.temperature {
            config.sampling.temperature = temperature;
        }
        if let Some(top_p) = stage_override.top_p {
            config.sampling.top_p = top_p;
        }
        if let Some(max_tokens) = stage_override.max_tokens {
            config.sampling.max_tokens = max_tokens;
        }
        if let Some(system_prompt) = &stage_override.system_prompt {
            config.system_prompt = Some(system_prompt.clone());
        }
    }
}
