use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;
use crate::outcome::{Outcome, OutcomeProbs, ScoreLine};

/// Largest goal difference treated as plausible when scoring closeness.
pub const MAX_PLAUSIBLE_GOAL_DIFF: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
}

impl MatchStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Some(MatchStatus::Scheduled),
            "in_progress" | "live" => Some(MatchStatus::InProgress),
            "completed" | "finished" => Some(MatchStatus::Completed),
            "cancelled" => Some(MatchStatus::Cancelled),
            "postponed" => Some(MatchStatus::Postponed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: String,
    pub status: MatchStatus,
    #[serde(default)]
    pub score: Option<ScoreLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Correct,
    Incorrect,
    Void,
    PartiallyCorrect,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Correct => "correct",
            SettlementStatus::Incorrect => "incorrect",
            SettlementStatus::Void => "void",
            SettlementStatus::PartiallyCorrect => "partially_correct",
        }
    }
}

/// A side selection attached to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "snake_case")]
pub enum MarketPick {
    BothTeamsToScore { yes: bool },
    TotalGoals { line: f64, over: bool },
}

impl MarketPick {
    pub fn is_correct(&self, actual: ScoreLine) -> bool {
        match *self {
            MarketPick::BothTeamsToScore { yes } => (actual.home > 0 && actual.away > 0) == yes,
            MarketPick::TotalGoals { line, over } => (actual.total() as f64 > line) == over,
        }
    }
}

/// What the ledger keeps about a prediction before it is settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: String,
    pub match_id: String,
    pub predicted_outcome: Outcome,
    #[serde(default)]
    pub predicted_score: Option<ScoreLine>,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: Option<OutcomeProbs>,
    #[serde(default)]
    pub stake: f64,
    /// Decimal price taken on the predicted outcome.
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub potential_return: Option<f64>,
    #[serde(default)]
    pub picks: Vec<MarketPick>,
}

impl StoredPrediction {
    /// Stake back plus winnings; falls back to stake × odds, then to the stake alone.
    pub fn potential_return(&self) -> f64 {
        self.potential_return
            .or_else(|| self.odds.filter(|o| *o > 1.0).map(|o| self.stake * o))
            .unwrap_or(self.stake)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub outcome_correct: bool,
    pub exact_score: bool,
    pub score_accuracy: Option<f64>,
    pub goal_difference_accuracy: Option<f64>,
    pub picks_correct: usize,
    pub picks_total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledPrediction {
    pub prediction_id: String,
    pub match_id: String,
    pub status: SettlementStatus,
    pub actual_score: Option<ScoreLine>,
    pub actual_outcome: Option<Outcome>,
    pub profit_loss: f64,
    pub points_earned: u32,
    pub metrics: PerformanceMetrics,
    pub settled_at: DateTime<Utc>,
}

/// Resolves a stored prediction against a final result.
///
/// Only completed, cancelled and postponed matches settle. The stake drives
/// profit and loss; side picks only change status and points.
pub fn settle(
    prediction: &StoredPrediction,
    result: &MatchResult,
    points_per_correct: u32,
    settled_at: DateTime<Utc>,
) -> Result<SettledPrediction, SettlementError> {
    if prediction.match_id != result.match_id {
        return Err(SettlementError::MatchMismatch {
            expected: prediction.match_id.clone(),
            actual: result.match_id.clone(),
        });
    }
    if prediction.stake < 0.0 || !prediction.stake.is_finite() {
        return Err(SettlementError::NegativeStake(prediction.id.clone()));
    }

    let score = match result.status {
        MatchStatus::Scheduled | MatchStatus::InProgress => {
            return Err(SettlementError::NotCompleted(result.match_id.clone()));
        }
        MatchStatus::Cancelled | MatchStatus::Postponed => {
            return Ok(SettledPrediction {
                prediction_id: prediction.id.clone(),
                match_id: prediction.match_id.clone(),
                status: SettlementStatus::Void,
                actual_score: None,
                actual_outcome: None,
                profit_loss: 0.0,
                points_earned: 0,
                metrics: PerformanceMetrics::default(),
                settled_at,
            });
        }
        MatchStatus::Completed => result
            .score
            .ok_or_else(|| SettlementError::MissingScore(result.match_id.clone()))?,
    };

    let actual_outcome = score.outcome();
    let outcome_correct = prediction.predicted_outcome == actual_outcome;
    let picks_correct = prediction
        .picks
        .iter()
        .filter(|p| p.is_correct(score))
        .count();
    let picks_total = prediction.picks.len();

    let status = match (outcome_correct, picks_correct) {
        (true, n) if n == picks_total => SettlementStatus::Correct,
        (false, 0) => SettlementStatus::Incorrect,
        _ => SettlementStatus::PartiallyCorrect,
    };
    let profit_loss = if outcome_correct {
        prediction.potential_return() - prediction.stake
    } else {
        -prediction.stake
    };
    let points_earned = if outcome_correct { points_per_correct } else { 0 }
        + picks_correct as u32 * (points_per_correct / 2);

    let metrics = PerformanceMetrics {
        outcome_correct,
        exact_score: prediction.predicted_score == Some(score),
        score_accuracy: prediction.predicted_score.map(|p| score_accuracy(p, score)),
        goal_difference_accuracy: prediction
            .predicted_score
            .map(|p| goal_difference_accuracy(p, score)),
        picks_correct,
        picks_total,
    };

    Ok(SettledPrediction {
        prediction_id: prediction.id.clone(),
        match_id: prediction.match_id.clone(),
        status,
        actual_score: Some(score),
        actual_outcome: Some(actual_outcome),
        profit_loss,
        points_earned,
        metrics,
        settled_at,
    })
}

/// Settling an already-settled prediction again.
///
/// The same score hands back the existing record untouched; a different one is refused.
pub fn resettle(
    existing: &SettledPrediction,
    prediction: &StoredPrediction,
    result: &MatchResult,
    points_per_correct: u32,
) -> Result<SettledPrediction, SettlementError> {
    let fresh = settle(prediction, result, points_per_correct, existing.settled_at)?;
    reconcile(existing, &fresh)
}

/// Keeps `existing` when `fresh` agrees with it on status and score.
pub fn reconcile(
    existing: &SettledPrediction,
    fresh: &SettledPrediction,
) -> Result<SettledPrediction, SettlementError> {
    if fresh.status == existing.status && fresh.actual_score == existing.actual_score {
        return Ok(existing.clone());
    }
    Err(SettlementError::ConflictingResult {
        id: existing.prediction_id.clone(),
        settled: describe(existing.actual_score),
        offered: describe(fresh.actual_score),
    })
}

fn describe(score: Option<ScoreLine>) -> String {
    score
        .map(|s| s.to_string())
        .unwrap_or_else(|| "void".to_string())
}

/// `1 − (|Δhome| + |Δaway|) / (2 × 5)`, clamped to [0, 1].
pub fn score_accuracy(predicted: ScoreLine, actual: ScoreLine) -> f64 {
    let delta = (predicted.home as f64 - actual.home as f64).abs()
        + (predicted.away as f64 - actual.away as f64).abs();
    (1.0 - delta / (2.0 * MAX_PLAUSIBLE_GOAL_DIFF)).clamp(0.0, 1.0)
}

/// `1 − |Δgoal difference| / (2 × 5)`, clamped to [0, 1].
pub fn goal_difference_accuracy(predicted: ScoreLine, actual: ScoreLine) -> f64 {
    let delta = (predicted.goal_difference() - actual.goal_difference()).abs() as f64;
    (1.0 - delta / (2.0 * MAX_PLAUSIBLE_GOAL_DIFF)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction() -> StoredPrediction {
        StoredPrediction {
            id: "p1".into(),
            match_id: "m1".into(),
            predicted_outcome: Outcome::HomeWin,
            predicted_score: Some(ScoreLine::new(2, 1)),
            confidence: 0.7,
            probabilities: None,
            stake: 10.0,
            odds: Some(2.1),
            potential_return: None,
            picks: Vec::new(),
        }
    }

    fn completed(h: u32, a: u32) -> MatchResult {
        MatchResult {
            match_id: "m1".into(),
            status: MatchStatus::Completed,
            score: Some(ScoreLine::new(h, a)),
        }
    }

    #[test]
    fn accuracy_metrics_are_clamped() {
        assert_eq!(score_accuracy(ScoreLine::new(2, 1), ScoreLine::new(2, 1)), 1.0);
        assert_eq!(score_accuracy(ScoreLine::new(0, 0), ScoreLine::new(8, 7)), 0.0);
        let gd = goal_difference_accuracy(ScoreLine::new(2, 1), ScoreLine::new(3, 0));
        assert!((gd - 0.8).abs() < 1e-12);
    }

    #[test]
    fn in_progress_match_does_not_settle() {
        let mut r = completed(1, 0);
        r.status = MatchStatus::InProgress;
        assert_eq!(
            settle(&prediction(), &r, 10, Utc::now()),
            Err(SettlementError::NotCompleted("m1".into()))
        );
    }

    #[test]
    fn side_pick_miss_makes_partial() {
        let mut p = prediction();
        p.picks = vec![MarketPick::BothTeamsToScore { yes: true }];
        let s = settle(&p, &completed(1, 0), 10, Utc::now()).unwrap();
        assert_eq!(s.status, SettlementStatus::PartiallyCorrect);
        assert_eq!(s.points_earned, 10);
        assert!((s.profit_loss - 11.0).abs() < 1e-9);
    }

    #[test]
    fn negative_stake_is_refused() {
        let mut p = prediction();
        p.stake = -1.0;
        assert!(matches!(
            settle(&p, &completed(1, 0), 10, Utc::now()),
            Err(SettlementError::NegativeStake(_))
        ));
    }
}
