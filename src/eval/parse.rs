use thiserror::Error;

/// Why a judge response violated the SCORE/VERDICT/REASON grammar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeParseError {
    #[error("judge response has no SCORE line")]
    MissingScore,
    #[error("judge SCORE is not a number: {0:?}")]
    InvalidScore(String),
    #[error("judge SCORE {0} outside [0,1]")]
    ScoreOutOfRange(f64),
    #[error("judge response has no REASON line")]
    MissingReason,
}

/// Machine-checkable judge response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJudgement {
    /// Normalized score in [0,1]
    pub score: f64,
    /// Explicit verdict when stated and unambiguous
    pub verdict: Option<bool>,
    /// Free-text reasoning
    pub reason: String,
}

/// Parse the strict judge grammar:
///
/// ```text
/// SCORE: <float in [0,1]>
/// VERDICT: pass | fail        (optional)
/// REASON: <free text to end of response>
/// ```
///
/// SCORE and REASON are mandatory; a response that omits either is
/// rejected rather than guessed at. A present but unrecognized VERDICT
/// counts as absent (the caller falls back to its threshold).
pub fn parse_judge_response(text: &str) -> Result<ParsedJudgement, JudgeParseError> {
    let mut score = None;
    let mut verdict = None;
    let mut reason_lines: Option<Vec<String>> = None;

    for line in text.lines() {
        if let Some(lines) = reason_lines.as_mut() {
            // Everything after REASON: belongs to the reason
            lines.push(line.to_string());
            continue;
        }
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("SCORE:") {
            let value = value.trim();
            let parsed: f64 = value
                .parse()
                .map_err(|_| JudgeParseError::InvalidScore(value.to_string()))?;
            if !(0.0..=1.0).contains(&parsed) {
                return Err(JudgeParseError::ScoreOutOfRange(parsed));
            }
            score = Some(parsed);
        } else if let Some(value) = trimmed.strip_prefix("VERDICT:") {
            verdict = match value.trim().to_lowercase().as_str() {
                "pass" => Some(true),
                "fail" => Some(false),
                _ => None,
            };
        } else if let Some(value) = trimmed.strip_prefix("REASON:") {
            reason_lines = Some(vec![value.trim().to_string()]);
        }
    }

    let score = score.ok_or(JudgeParseError::MissingScore)?;
    let reason = reason_lines
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|reason| !reason.is_empty())
        .ok_or(JudgeParseError::MissingReason)?;

    Ok(ParsedJudgement {
        score,
        verdict,
        reason,
    })
}
