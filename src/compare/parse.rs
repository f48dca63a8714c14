use thiserror::Error;

use crate::models::{Criterion, CriterionScores};

/// Why a comparison judge response violated the
/// CRITERION/SCORE_A/SCORE_B/REASONING grammar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComparisonParseError {
    #[error("judge response has no REASONING line")]
    MissingReasoning,
    #[error("criterion {0} missing from judge response")]
    MissingCriterion(Criterion),
    #[error("judge scored unknown criterion {0:?}")]
    UnknownCriterion(String),
    #[error("judge scored unrequested criterion {0}")]
    UnexpectedCriterion(Criterion),
    #[error("criterion {0} scored more than once")]
    DuplicateCriterion(Criterion),
    #[error("criterion {criterion} missing {side}")]
    MissingScore {
        criterion: Criterion,
        side: &'static str,
    },
    #[error("score line before any CRITERION line")]
    ScoreOutsideBlock,
    #[error("score is not a number: {0:?}")]
    InvalidScore(String),
    #[error("score {0} outside [0,1]")]
    ScoreOutOfRange(f64),
}

/// Parse one stage-judge response against the requested criteria:
///
/// ```text
/// CRITERION: <name>
/// SCORE_A: <float in [0,1]>
/// SCORE_B: <float in [0,1]>
///   ... one block per requested criterion ...
/// REASONING: <free text to end of response>
/// ```
///
/// Strict contract: every requested criterion exactly once, both scores
/// present and in range, no extra criteria, REASONING mandatory. Scores
/// are returned in request order.
pub fn parse_comparison_response(
    text: &str,
    criteria: &[Criterion],
) -> Result<(Vec<CriterionScores>, String), ComparisonParseError> {
    struct Block {
        criterion: Criterion,
        score_a: Option<f64>,
        score_b: Option<f64>,
    }

    let mut blocks: Vec<Block> = Vec::new();
    let mut reasoning_lines: Option<Vec<String>> = None;

    let parse_score = |value: &str| -> Result<f64, ComparisonParseError> {
        let value = value.trim();
        let parsed: f64 = value
            .parse()
            .map_err(|_| ComparisonParseError::InvalidScore(value.to_string()))?;
        if !(0.0..=1.0).contains(&parsed) {
            return Err(ComparisonParseError::ScoreOutOfRange(parsed));
        }
        Ok(parsed)
    };

    for line in text.lines() {
        if let Some(lines) = reasoning_lines.as_mut() {
            lines.push(line.to_string());
            continue;
        }
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("CRITERION:") {
            let name = value.trim();
            let criterion: Criterion = name
                .parse()
                .map_err(|_| ComparisonParseError::UnknownCriterion(name.to_string()))?;
            if !criteria.contains(&criterion) {
                return Err(ComparisonParseError::UnexpectedCriterion(criterion));
            }
            if blocks.iter().any(|b| b.criterion == criterion) {
                return Err(ComparisonParseError::DuplicateCriterion(criterion));
            }
            blocks.push(Block {
                criterion,
                score_a: None,
                score_b: None,
            });
        } else if let Some(value) = trimmed.strip_prefix("SCORE_A:") {
            let block = blocks
                .last_mut()
                .ok_or(ComparisonParseError::ScoreOutsideBlock)?;
            block.score_a = Some(parse_score(value)?);
        } else if let Some(value) = trimmed.strip_prefix("SCORE_B:") {
            let block = blocks
                .last_mut()
                .ok_or(ComparisonParseError::ScoreOutsideBlock)?;
            block.score_b = Some(parse_score(value)?);
        } else if let Some(value) = trimmed.strip_prefix("REASONING:") {
            reasoning_lines = Some(vec![value.trim().to_string()]);
        }
    }

    let reasoning = reasoning_lines
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|reasoning| !reasoning.is_empty())
        .ok_or(ComparisonParseError::MissingReasoning)?;

    // Return scores in request order, every criterion accounted for
    let mut scores = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        let block = blocks
            .iter()
            .find(|b| b.criterion == *criterion)
            .ok_or(ComparisonParseError::MissingCriterion(*criterion))?;
        let score_a = block.score_a.ok_or(ComparisonParseError::MissingScore {
            criterion: *criterion,
            side: "SCORE_A",
        })?;
        let score_b = block.score_b.ok_or(ComparisonParseError::MissingScore {
            criterion: *criterion,
            side: "SCORE_B",
        })?;
        scores.push(CriterionScores {
            criterion: *criterion,
            score_a,
            score_b,
        });
    }

    Ok((scores, reasoning))
}
