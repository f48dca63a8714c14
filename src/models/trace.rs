use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sampling parameters for a single model invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Nucleus sampling cutoff
    pub top_p: f64,
    /// Maximum tokens in the response
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 1.0,
            max_tokens: 4096,
        }
    }
}

/// One billed model invocation, success or failure. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// What this call was for (e.g. "stage:facts", "eval:faithfulness", "judge:summary")
    pub label: String,
    /// Model that was invoked
    pub model: String,
    /// Sampling parameters used
    pub sampling: SamplingParams,
    /// Tokens billed for the prompt
    pub input_tokens: u64,
    /// Tokens billed for the completion
    pub output_tokens: u64,
    /// Billed cost in USD (0.0 when the provider never billed the call)
    pub cost_usd: f64,
    /// Wall-clock duration of the call
    pub duration_ms: u64,
    /// Whether the call returned a usable completion
    pub succeeded: bool,
    /// System prompt sent with the call, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// When the call was made
    pub created_at: DateTime<Utc>,
}

/// Token and cost totals aggregated over a set of trace records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl UsageTotals {
    /// Fold one trace into the totals
    pub fn add(&mut self, trace: &TraceRecord) {
        self.input_tokens += trace.input_tokens;
        self.output_tokens += trace.output_tokens;
        self.cost_usd += trace.cost_usd;
    }

    /// Sum totals over a slice of traces
    pub fn from_traces(traces: &[TraceRecord]) -> Self {
        let mut totals = Self::default();
        for trace in traces {
            totals.add(trace);
        }
        totals
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
