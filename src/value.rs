use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::odds::{ConsensusOdds, OddsMovement, OddsSnapshot, detect_movement};
use crate::outcome::{Outcome, OutcomeProbs};

/// Hard ceiling on any recommended stake, whatever the configuration says.
pub const KELLY_CEILING: f64 = 0.10;

/// Odds problems that degrade the assessment instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsIssue {
    NoUsableOdds,
    PartialBook,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeValue {
    pub outcome: Outcome,
    pub model_probability: f64,
    pub odds: Option<f64>,
    /// Margin-free implied probability.
    pub implied_probability: Option<f64>,
    pub edge: Option<f64>,
    /// Expected return per unit staked: p × odds − 1.
    pub expected_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAssessment {
    pub best_bet: Option<Outcome>,
    pub edge: f64,
    pub kelly_fraction: f64,
    pub value_rating: f64,
    /// Only defined when all three outcomes are priced.
    pub market_efficiency: Option<f64>,
    pub consensus: ConsensusOdds,
    pub outcomes: Vec<OutcomeValue>,
    #[serde(default)]
    pub movements: Vec<OddsMovement>,
    #[serde(default)]
    pub issues: Vec<OddsIssue>,
}

impl ValueAssessment {
    pub fn has_value(&self) -> bool {
        self.best_bet.is_some() && self.edge > 0.0
    }
}

/// `(odds × p − 1) / (odds − 1)`, clamped to `[0, cap]` with `cap ≤ 0.10`.
pub fn kelly_fraction(odds: f64, probability: f64, cap: f64) -> f64 {
    if !odds.is_finite() || odds <= 1.0 || !probability.is_finite() {
        return 0.0;
    }
    let cap = cap.clamp(0.0, KELLY_CEILING);
    let raw = (odds * probability - 1.0) / (odds - 1.0);
    raw.clamp(0.0, cap)
}

#[derive(Debug, Clone, Copy)]
pub struct ValueAnalyzer {
    max_kelly: f64,
    movement_threshold: f64,
}

impl ValueAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_kelly: config.max_kelly_fraction.clamp(0.0, KELLY_CEILING),
            movement_threshold: config.odds_movement_threshold,
        }
    }

    pub fn assess(
        &self,
        probabilities: &OutcomeProbs,
        confidence: f64,
        odds: &OddsSnapshot,
        previous: Option<&OddsSnapshot>,
    ) -> ValueAssessment {
        let probabilities = probabilities.normalized();
        let consensus = odds.consensus();
        let movements = previous
            .map(|prev| detect_movement(prev, odds, self.movement_threshold))
            .unwrap_or_default();

        let raw_implied: Vec<(Outcome, f64)> = Outcome::ALL
            .into_iter()
            .filter_map(|o| consensus.get(o).map(|price| (o, 1.0 / price)))
            .collect();
        let raw_sum: f64 = raw_implied.iter().map(|(_, p)| p).sum();

        let outcomes: Vec<OutcomeValue> = Outcome::ALL
            .into_iter()
            .map(|o| {
                let model_probability = probabilities.get(o);
                let price = consensus.get(o);
                let implied = raw_implied
                    .iter()
                    .find(|(x, _)| *x == o)
                    .map(|(_, p)| p / raw_sum);
                OutcomeValue {
                    outcome: o,
                    model_probability,
                    odds: price,
                    implied_probability: implied,
                    edge: implied.map(|ip| model_probability - ip),
                    expected_value: price.map(|price| model_probability * price - 1.0),
                }
            })
            .collect();

        let mut issues = Vec::new();
        if consensus.is_empty() {
            issues.push(OddsIssue::NoUsableOdds);
        } else if !consensus.is_complete() {
            issues.push(OddsIssue::PartialBook);
        }

        let best = outcomes
            .iter()
            .filter_map(|v| v.edge.map(|e| (v, e)))
            .fold(None::<(&OutcomeValue, f64)>, |best, (v, e)| match best {
                Some((_, be)) if be >= e => best,
                _ => Some((v, e)),
            });

        let (best_bet, edge, kelly) = match best {
            Some((v, e)) => {
                let kelly = match v.odds {
                    Some(price) if e > 0.0 => {
                        kelly_fraction(price, v.model_probability, self.max_kelly)
                    }
                    _ => 0.0,
                };
                (Some(v.outcome), e, kelly)
            }
            None => (None, 0.0, 0.0),
        };
        if !issues.is_empty() {
            debug!(?issues, "odds degraded for value assessment");
        }

        ValueAssessment {
            best_bet,
            edge,
            kelly_fraction: kelly,
            value_rating: edge * confidence,
            market_efficiency: consensus
                .is_complete()
                .then(|| 1.0 - (1.0 - raw_sum).abs()),
            consensus,
            outcomes,
            movements,
            issues,
        }
    }
}
