use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ProviderWeights;
use crate::error::PredictError;
use crate::forecast::RawForecast;
use crate::outcome::{Outcome, OutcomeProbs, ScoreLine};

const MIN_CONFIDENCE_MULT: f64 = 0.5;
const MAX_CONFIDENCE_MULT: f64 = 1.0;
const TIE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Reasons a prediction is usable but weaker than it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caveat {
    ModelDisagreement,
    PartialProviderSet,
    SingleProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyMetrics {
    pub confidence_std: f64,
    pub home_score_variance: f64,
    pub away_score_variance: f64,
    pub distinct_outcomes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Distinct providers that contributed.
    pub model_diversity: usize,
    pub confidence_range: f64,
    pub ensemble_strength: f64,
    pub uncertainty_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderContribution {
    pub provider_id: String,
    pub base_weight: f64,
    pub weight: f64,
    pub outcome: Outcome,
    pub confidence: f64,
}

/// Blended view of every admitted forecast. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub outcome: Outcome,
    pub score: ScoreLine,
    /// Weighted goals before rounding; the handicap grid uses these as rates.
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub confidence: f64,
    pub probabilities: OutcomeProbs,
    pub consistency: f64,
    pub model_agreement: bool,
    pub risk: RiskLevel,
    pub uncertainty: UncertaintyMetrics,
    pub quality: QualityMetrics,
    pub contributions: Vec<ProviderContribution>,
    pub reasoning: Vec<String>,
    pub key_factors: Vec<String>,
    pub caveats: Vec<Caveat>,
}

/// The effective multiplier a provider's confidence applies to its prior.
pub fn confidence_multiplier(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return MIN_CONFIDENCE_MULT;
    }
    confidence.clamp(MIN_CONFIDENCE_MULT, MAX_CONFIDENCE_MULT)
}

/// Prior × clamped confidence, renormalized over the forecasts present.
///
/// If every prior is zero the providers share equally.
pub fn dynamic_weights(forecasts: &[RawForecast], priors: &ProviderWeights) -> Vec<f64> {
    let raw: Vec<f64> = forecasts
        .iter()
        .map(|f| priors.base(&f.provider_id) * confidence_multiplier(f.confidence))
        .collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        let n = forecasts.len().max(1) as f64;
        return vec![1.0 / n; forecasts.len()];
    }
    raw.into_iter().map(|w| w / total).collect()
}

/// Merges validated forecasts into one prediction.
///
/// Pure: the same forecasts in the same order always give the same result.
pub fn aggregate(
    forecasts: &[RawForecast],
    priors: &ProviderWeights,
) -> Result<EnsembleForecast, PredictError> {
    if forecasts.is_empty() {
        return Err(PredictError::NoForecasts);
    }
    let weights = dynamic_weights(forecasts, priors);

    let mut expected_home = 0.0;
    let mut expected_away = 0.0;
    let mut confidence = 0.0;
    let mut mass = OutcomeProbs::default();
    for (f, w) in forecasts.iter().zip(&weights) {
        expected_home += w * f.score_prediction.home as f64;
        expected_away += w * f.score_prediction.away as f64;
        confidence += w * f.confidence;
        mass.add(f.predicted_outcome, *w);
    }
    let probabilities = mass.normalized();
    let outcome = pick_outcome(&probabilities, forecasts);
    let score = ScoreLine::new(round_goals(expected_home), round_goals(expected_away));
    let confidence = confidence.clamp(0.0, 1.0);

    let confidences: Vec<f64> = forecasts.iter().map(|f| f.confidence).collect();
    let homes: Vec<f64> = forecasts
        .iter()
        .map(|f| f.score_prediction.home as f64)
        .collect();
    let aways: Vec<f64> = forecasts
        .iter()
        .map(|f| f.score_prediction.away as f64)
        .collect();
    let distinct_outcomes = forecasts
        .iter()
        .map(|f| f.predicted_outcome)
        .collect::<BTreeSet<_>>()
        .len();

    let uncertainty = UncertaintyMetrics {
        confidence_std: variance(&confidences).sqrt(),
        home_score_variance: variance(&homes),
        away_score_variance: variance(&aways),
        distinct_outcomes,
    };
    let consistency = consistency_score(
        (uncertainty.home_score_variance + uncertainty.away_score_variance) / 2.0,
        distinct_outcomes,
    );
    let risk = risk_level(consistency, mean(&confidences));

    let model_diversity = forecasts
        .iter()
        .map(|f| f.provider_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let max_conf = confidences.iter().copied().fold(f64::MIN, f64::max);
    let min_conf = confidences.iter().copied().fold(f64::MAX, f64::min);
    let quality = QualityMetrics {
        model_diversity,
        confidence_range: max_conf - min_conf,
        ensemble_strength: consistency * confidence,
        uncertainty_level: 1.0 - consistency,
    };

    let contributions = forecasts
        .iter()
        .zip(&weights)
        .map(|(f, w)| ProviderContribution {
            provider_id: f.provider_id.clone(),
            base_weight: priors.base(&f.provider_id),
            weight: *w,
            outcome: f.predicted_outcome,
            confidence: f.confidence,
        })
        .collect();

    let mut caveats = Vec::new();
    if distinct_outcomes > 1 {
        caveats.push(Caveat::ModelDisagreement);
    }
    if forecasts.len() == 1 {
        caveats.push(Caveat::SingleProvider);
    }

    Ok(EnsembleForecast {
        outcome,
        score,
        expected_home_goals: expected_home,
        expected_away_goals: expected_away,
        confidence,
        probabilities,
        consistency,
        model_agreement: distinct_outcomes == 1,
        risk,
        uncertainty,
        quality,
        contributions,
        reasoning: merge_unique(forecasts.iter().map(|f| &f.reasoning)),
        key_factors: merge_unique(forecasts.iter().map(|f| &f.key_factors)),
        caveats,
    })
}

/// `1 / (1 + avg variance) × 1 / distinct`, rounded to two decimals.
pub fn consistency_score(avg_score_variance: f64, distinct_outcomes: usize) -> f64 {
    let numeric = 1.0 / (1.0 + avg_score_variance.max(0.0));
    let categorical = 1.0 / distinct_outcomes.max(1) as f64;
    round2(numeric * categorical)
}

pub fn risk_level(consistency: f64, mean_confidence: f64) -> RiskLevel {
    if consistency > 0.8 && mean_confidence > 0.75 {
        RiskLevel::Low
    } else if consistency < 0.5 || mean_confidence < 0.5 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

// Highest mass wins. Ties go to the unweighted majority, then to whichever
// tied outcome the earliest forecast voted for.
fn pick_outcome(mass: &OutcomeProbs, forecasts: &[RawForecast]) -> Outcome {
    let top = mass.iter().map(|(_, m)| m).fold(f64::MIN, f64::max);
    let tied: Vec<Outcome> = mass
        .iter()
        .filter(|(_, m)| (top - m).abs() <= TIE_EPS)
        .map(|(o, _)| o)
        .collect();
    if tied.len() == 1 {
        return tied[0];
    }

    let votes = |o: Outcome| forecasts.iter().filter(|f| f.predicted_outcome == o).count();
    let most = tied.iter().map(|o| votes(*o)).max().unwrap_or(0);
    let finalists: Vec<Outcome> = tied.into_iter().filter(|o| votes(*o) == most).collect();

    forecasts
        .iter()
        .map(|f| f.predicted_outcome)
        .find(|o| finalists.contains(o))
        .unwrap_or(mass.argmax())
}

fn round_goals(expected: f64) -> u32 {
    expected.max(0.0).round() as u32
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn merge_unique<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for item in lists.flatten() {
        let key = item.trim();
        if key.is_empty() || !seen.insert(key.to_string()) {
            continue;
        }
        out.push(key.to_string());
    }
    out
}
