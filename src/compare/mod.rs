pub mod judge;
pub mod parse;

pub use judge::run_comparison;
pub use parse::{parse_comparison_response, ComparisonParseError};

use thiserror::Error;

use crate::models::{Criterion, StageKind, UsageTotals};

/// Default judge model when a comparison request does not name one
pub const DEFAULT_JUDGE_MODEL: &str = "claude-sonnet-4-20250514";

/// One comparison request: the two analyses are passed by value to
/// [`run_comparison`]; this holds the judge configuration.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    /// Model that judges all three stages
    pub judge_model: String,
    /// Criteria to score; must be non-empty
    pub criteria: Vec<Criterion>,
}

impl ComparisonRequest {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self {
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            criteria,
        }
    }
}

/// Why a comparison produced no result
#[derive(Debug, Error)]
pub enum ComparisonError {
    /// Precondition failure; no judge call was made
    #[error("invalid comparison input: {0}")]
    InvalidComparisonInput(String),
    /// One stage's judge call failed after retries, or its response
    /// violated the grammar; a partial comparison is never emitted
    #[error("stage {stage} judge call failed: {detail}")]
    StageJudgeFailed {
        stage: StageKind,
        detail: String,
        /// Judge spend already billed when the comparison failed
        judge_usage: UsageTotals,
    },
}
