use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;
use crate::outcome::{Outcome, OutcomeProbs, ScoreLine};

/// One provider's opinion after validation. Confidence is always within [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecast {
    pub provider_id: String,
    pub predicted_outcome: Outcome,
    pub score_prediction: ScoreLine,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub key_factors: Vec<String>,
    /// Only the statistical classifier reports a full probability triple.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_probabilities: Option<OutcomeProbs>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_importance: BTreeMap<String, f64>,
}

/// The loosely-typed object a provider hands back, before validation.
///
/// Every field is optional so a half-formed reply from a chat model still
/// deserializes and the validator can say exactly what was missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastCandidate {
    #[serde(default, alias = "outcome")]
    pub predicted_outcome: Option<String>,
    #[serde(default)]
    pub score_prediction: Option<CandidateScore>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<Vec<String>>,
    #[serde(default)]
    pub key_factors: Option<Vec<String>>,
    #[serde(default)]
    pub outcome_probabilities: Option<OutcomeProbs>,
    #[serde(default)]
    pub feature_importance: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    #[serde(default)]
    pub home: Option<f64>,
    #[serde(default)]
    pub away: Option<f64>,
}

/// Checks required fields and ranges. Never coerces: a bad value is a rejection.
pub fn validate_forecast(
    provider_id: &str,
    candidate: &ForecastCandidate,
) -> Result<RawForecast, ValidationError> {
    let outcome_raw = candidate
        .predicted_outcome
        .as_deref()
        .ok_or(ValidationError::MissingField("predicted_outcome"))?;
    let score = candidate
        .score_prediction
        .as_ref()
        .ok_or(ValidationError::MissingField("score_prediction"))?;
    let confidence = candidate
        .confidence
        .ok_or(ValidationError::MissingField("confidence"))?;
    let reasoning = candidate
        .reasoning
        .as_ref()
        .ok_or(ValidationError::MissingField("reasoning"))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(confidence));
    }
    let predicted_outcome = Outcome::parse(outcome_raw)
        .ok_or_else(|| ValidationError::UnknownOutcome(outcome_raw.to_string()))?;

    let home = score_side("home", "score_prediction.home", score.home)?;
    let away = score_side("away", "score_prediction.away", score.away)?;

    Ok(RawForecast {
        provider_id: provider_id.to_string(),
        predicted_outcome,
        score_prediction: ScoreLine::new(home, away),
        confidence,
        reasoning: reasoning.clone(),
        key_factors: candidate.key_factors.clone().unwrap_or_default(),
        outcome_probabilities: candidate.outcome_probabilities.map(|p| p.normalized()),
        feature_importance: candidate.feature_importance.clone().unwrap_or_default(),
    })
}

fn score_side(
    side: &'static str,
    field: &'static str,
    value: Option<f64>,
) -> Result<u32, ValidationError> {
    let v = value.ok_or(ValidationError::MissingField(field))?;
    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(ValidationError::InvalidScore { side, value: v });
    }
    Ok(v as u32)
}

/// Validates every candidate, logging and dropping the rejects.
///
/// Input order is preserved for the survivors; the ensemble tie-break depends on it.
pub fn admit_forecasts<'a, I>(candidates: I) -> (Vec<RawForecast>, Vec<(String, ValidationError)>)
where
    I: IntoIterator<Item = (&'a str, &'a ForecastCandidate)>,
{
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for (provider_id, candidate) in candidates {
        match validate_forecast(provider_id, candidate) {
            Ok(forecast) => accepted.push(forecast),
            Err(err) => {
                warn!(provider = provider_id, reason = %err, "forecast rejected");
                rejected.push((provider_id.to_string(), err));
            }
        }
    }
    (accepted, rejected)
}
