use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::StageKind;
use super::trace::UsageTotals;

/// Fixed rubric of comparison criteria the judge can score against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Groundedness,
    Faithfulness,
    Completeness,
    Clarity,
    Accuracy,
}

impl Criterion {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Groundedness => "groundedness",
            Self::Faithfulness => "faithfulness",
            Self::Completeness => "completeness",
            Self::Clarity => "clarity",
            Self::Accuracy => "accuracy",
        }
    }

    /// What the judge should look for
    pub fn description(&self) -> &'static str {
        match self {
            Self::Groundedness => "Is every claim anchored in the source transcript?",
            Self::Faithfulness => "Does the output avoid contradicting the source?",
            Self::Completeness => "Are the important points of the source covered?",
            Self::Clarity => "Is the output well organized and easy to follow?",
            Self::Accuracy => "Are stated facts, names, and figures correct?",
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groundedness" => Ok(Self::Groundedness),
            "faithfulness" => Ok(Self::Faithfulness),
            "completeness" => Ok(Self::Completeness),
            "clarity" => Ok(Self::Clarity),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(format!("unknown criterion {other:?}")),
        }
    }
}

/// Which side won a criterion, a stage, or the whole comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

/// Judge scores for one criterion across both sides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionScores {
    pub criterion: Criterion,
    /// Score for analysis A, in [0,1]
    pub score_a: f64,
    /// Score for analysis B, in [0,1]
    pub score_b: f64,
}

/// Judged comparison of one pipeline stage's two outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageComparison {
    pub stage: StageKind,
    /// One entry per requested criterion, in request order
    pub scores: Vec<CriterionScores>,
    /// Majority of per-criterion wins; equal counts are a tie
    pub winner: Winner,
    /// Judge's free-text reasoning for this stage
    pub reasoning: String,
}

impl StageComparison {
    /// Derive the stage winner from per-criterion scores: majority of
    /// criteria where one side strictly beats the other.
    pub fn derive_winner(scores: &[CriterionScores]) -> Winner {
        let mut a_wins = 0usize;
        let mut b_wins = 0usize;
        for score in scores {
            if score.score_a > score.score_b {
                a_wins += 1;
            } else if score.score_b > score.score_a {
                b_wins += 1;
            }
        }
        match a_wins.cmp(&b_wins) {
            std::cmp::Ordering::Greater => Winner::A,
            std::cmp::Ordering::Less => Winner::B,
            std::cmp::Ordering::Equal => Winner::Tie,
        }
    }
}

/// Completed comparison of two analyses. Immutable; references the
/// analyses by id and can be deleted without touching them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub id: Uuid,
    pub analysis_a: Uuid,
    pub analysis_b: Uuid,
    /// Model that judged all three stages
    pub judge_model: String,
    /// Criteria the judge scored, in request order
    pub criteria: Vec<Criterion>,
    /// Exactly three entries, one per pipeline stage
    pub stages: Vec<StageComparison>,
    /// Majority vote over the three stage winners
    pub overall_winner: Winner,
    pub overall_reasoning: String,
    /// Aggregate usage of the judge calls, billed failures included
    pub judge_usage: UsageTotals,
    /// B's total analysis cost minus A's, in USD
    pub cost_delta_usd: f64,
    /// Mean (score_b - score_a) over all criteria and stages
    pub quality_delta: f64,
    pub created_at: DateTime<Utc>,
}

/// Derive the overall winner by majority vote over stage winners; ties in
/// the vote resolve to Tie.
pub fn overall_winner(stage_winners: &[Winner]) -> Winner {
    let a = stage_winners.iter().filter(|w| **w == Winner::A).count();
    let b = stage_winners.iter().filter(|w| **w == Winner::B).count();
    match a.cmp(&b) {
        std::cmp::Ordering::Greater => Winner::A,
        std::cmp::Ordering::Less => Winner::B,
        std::cmp::Ordering::Equal => Winner::Tie,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(f64, f64)]) -> Vec<CriterionScores> {
        pairs
            .iter()
            .map(|&(score_a, score_b)| CriterionScores {
                criterion: Criterion::Accuracy,
                score_a,
                score_b,
            })
            .collect()
    }

    #[test]
    fn test_stage_winner_majority() {
        assert_eq!(
            StageComparison::derive_winner(&scores(&[(0.9, 0.6)])),
            Winner::A
        );
        assert_eq!(
            StageComparison::derive_winner(&scores(&[(0.2, 0.6), (0.4, 0.5), (0.9, 0.1)])),
            Winner::B
        );
    }

    #[test]
    fn test_stage_winner_tie_on_equal_counts() {
        assert_eq!(
            StageComparison::derive_winner(&scores(&[(0.9, 0.1), (0.1, 0.9)])),
            Winner::Tie
        );
        // Equal scores count for neither side
        assert_eq!(
            StageComparison::derive_winner(&scores(&[(0.5, 0.5)])),
            Winner::Tie
        );
    }

    #[test]
    fn test_overall_winner_majority_vote() {
        assert_eq!(
            overall_winner(&[Winner::A, Winner::A, Winner::B]),
            Winner::A
        );
        assert_eq!(
            overall_winner(&[Winner::B, Winner::Tie, Winner::B]),
            Winner::B
        );
        assert_eq!(
            overall_winner(&[Winner::A, Winner::B, Winner::Tie]),
            Winner::Tie
        );
        assert_eq!(
            overall_winner(&[Winner::Tie, Winner::Tie, Winner::Tie]),
            Winner::Tie
        );
    }

    #[test]
    fn test_criterion_from_str() {
        assert_eq!("accuracy".parse::<Criterion>().unwrap(), Criterion::Accuracy);
        assert_eq!(
            " Clarity ".parse::<Criterion>().unwrap(),
            Criterion::Clarity
        );
        assert!("speed".parse::<Criterion>().is_err());
    }
}
