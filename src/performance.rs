use serde::{Deserialize, Serialize};

use crate::calibration::{Metrics, evaluate_probs};
use crate::outcome::{Outcome, OutcomeProbs};
use crate::settlement::{SettledPrediction, SettlementStatus, StoredPrediction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub correct: usize,
    pub partially_correct: usize,
    pub incorrect: usize,
    pub void: usize,
    pub pending: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: SettlementStatus) {
        match status {
            SettlementStatus::Correct => self.correct += 1,
            SettlementStatus::PartiallyCorrect => self.partially_correct += 1,
            SettlementStatus::Incorrect => self.incorrect += 1,
            SettlementStatus::Void => self.void += 1,
            SettlementStatus::Pending => self.pending += 1,
        }
    }

    /// Predictions that reached a verdict.
    pub fn decided(&self) -> usize {
        self.correct + self.partially_correct + self.incorrect
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total: usize,
    pub counts: StatusCounts,
    /// Share of decided predictions whose headline outcome was right.
    pub accuracy: f64,
    pub exact_scores: usize,
    pub points: u32,
    pub staked: f64,
    pub profit_loss: f64,
    pub roi: f64,
    pub best_streak: usize,
    pub current_streak: usize,
    pub average_confidence: f64,
    /// Brier, log loss and argmax accuracy over predictions that stored a probability triple.
    pub probability_metrics: Metrics,
}

/// Folds settled predictions in the order given; streaks assume that order is chronological.
pub fn summarize(history: &[(StoredPrediction, SettledPrediction)]) -> PerformanceSummary {
    let mut out = PerformanceSummary {
        total: history.len(),
        ..Default::default()
    };
    if history.is_empty() {
        return out;
    }

    let mut outcome_hits = 0usize;
    let mut streak = 0usize;
    let mut confidence_sum = 0.0;
    let mut probs: Vec<OutcomeProbs> = Vec::new();
    let mut actual: Vec<Outcome> = Vec::new();

    for (prediction, settled) in history {
        out.counts.bump(settled.status);
        out.points += settled.points_earned;
        out.profit_loss += settled.profit_loss;
        confidence_sum += prediction.confidence;

        if settled.status == SettlementStatus::Void || settled.status == SettlementStatus::Pending {
            continue;
        }
        out.staked += prediction.stake;
        if settled.metrics.exact_score {
            out.exact_scores += 1;
        }
        if settled.metrics.outcome_correct {
            outcome_hits += 1;
            streak += 1;
            out.best_streak = out.best_streak.max(streak);
        } else {
            streak = 0;
        }
        if let (Some(p), Some(o)) = (prediction.probabilities, settled.actual_outcome) {
            probs.push(p);
            actual.push(o);
        }
    }

    let decided = out.counts.decided();
    if decided > 0 {
        out.accuracy = outcome_hits as f64 / decided as f64;
    }
    if out.staked > 0.0 {
        out.roi = out.profit_loss / out.staked;
    }
    out.current_streak = streak;
    out.average_confidence = confidence_sum / history.len() as f64;
    out.probability_metrics = evaluate_probs(&probs, &actual);
    out
}
