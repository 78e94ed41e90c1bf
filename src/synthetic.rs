use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ProviderError;
use crate::forecast::{CandidateScore, ForecastCandidate};
use crate::match_context::MatchContext;
use crate::outcome::{Outcome, OutcomeProbs};
use crate::provider::{CancelToken, ForecastProvider};

/// Offline stand-in for a chat forecaster: a rating-driven guess with seeded jitter.
///
/// The same seed and match id always produce the same forecast.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    id: String,
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(id: &str, seed: u64) -> Self {
        Self {
            id: id.to_string(),
            seed,
        }
    }

    fn rng_for(&self, ctx: &MatchContext) -> StdRng {
        // FNV-1a over the match id, mixed with the provider seed.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in ctx.match_id.bytes().chain(self.id.bytes()) {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        StdRng::seed_from_u64(h ^ self.seed)
    }
}

impl ForecastProvider for SyntheticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn forecast(
        &self,
        ctx: &MatchContext,
        cancel: &CancelToken,
    ) -> Result<ForecastCandidate, ProviderError> {
        cancel.check()?;
        let mut rng = self.rng_for(ctx);

        let gap = (ctx.home_attacking_strength() - ctx.away_attacking_strength()) / 20.0;
        let home = (0.45 + gap + rng.gen_range(-0.08..0.08)).clamp(0.05, 0.9);
        let away = (0.30 - gap + rng.gen_range(-0.08..0.08)).clamp(0.05, 0.9);
        let draw = (0.27_f64 + rng.gen_range(-0.05..0.05)).max(0.05);
        let probs = OutcomeProbs::new(home, draw, away).normalized();
        let outcome = probs.argmax();

        let low: u32 = rng.gen_range(0..=1);
        let margin: u32 = rng.gen_range(1..=2);
        let (h, a) = match outcome {
            Outcome::HomeWin => (low + margin, low),
            Outcome::AwayWin => (low, low + margin),
            Outcome::Draw => (low, low),
        };
        let confidence = (probs.get(outcome) + rng.gen_range(0.05..0.2)).min(0.95);

        Ok(ForecastCandidate {
            predicted_outcome: Some(outcome.as_str().to_string()),
            score_prediction: Some(CandidateScore {
                home: Some(h as f64),
                away: Some(a as f64),
            }),
            confidence: Some(confidence),
            reasoning: Some(vec![format!(
                "Synthetic view of {} vs {}",
                ctx.home.name, ctx.away.name
            )]),
            key_factors: Some(vec!["team strength".to_string()]),
            outcome_probabilities: None,
            feature_importance: None,
        })
    }
}
