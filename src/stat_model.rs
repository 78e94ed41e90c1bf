use std::collections::BTreeMap;

use tracing::debug;

use crate::calibration::apply_logit_calibration;
use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::forecast::{CandidateScore, ForecastCandidate};
use crate::match_context::MatchContext;
use crate::outcome::{Outcome, OutcomeProbs};
use crate::provider::{CancelToken, ForecastProvider};
use crate::score_grid::{GOALS_TOTAL_BASE, HOME_ADV_GOALS, ScoreGrid, lambdas_from_diff};

pub const PROVIDER_ID: &str = "statistical";

pub const FEATURE_COLUMNS: [&str; 18] = [
    "home_team_rating",
    "away_team_rating",
    "home_form_points",
    "away_form_points",
    "home_goals_scored_avg",
    "home_goals_conceded_avg",
    "away_goals_scored_avg",
    "away_goals_conceded_avg",
    "head_to_head_home_wins",
    "head_to_head_away_wins",
    "home_win_streak",
    "away_win_streak",
    "home_rest_days",
    "away_rest_days",
    "is_derby",
    "is_neutral_venue",
    "weather_temperature",
    "weather_precipitation",
];

// Goal-difference contribution per unit of each feature. Paired columns
// carry opposite signs.
const COEFFICIENTS: [f64; 18] = [
    0.030, -0.030, // rating
    0.040, -0.040, // form points
    0.150, -0.150, // home attack / defence
    -0.150, 0.150, // away attack / defence
    0.050, -0.050, // head to head
    0.030, -0.030, // win streak
    0.010, -0.010, // rest
    0.0, 0.0, 0.0, 0.0,
];

const TOTAL_SHRINK: f64 = 0.35;
const DERBY_TOTAL_FACTOR: f64 = 0.95;
const WEATHER_TOTAL_FACTOR: f64 = 0.3;

/// Flat feature row in `FEATURE_COLUMNS` order.
pub fn prepare_features(ctx: &MatchContext) -> [f64; 18] {
    let weather = ctx.weather.unwrap_or_default();
    [
        ctx.home.rating,
        ctx.away.rating,
        ctx.home.form_points as f64,
        ctx.away.form_points as f64,
        ctx.home.goals_scored_avg,
        ctx.home.goals_conceded_avg,
        ctx.away.goals_scored_avg,
        ctx.away.goals_conceded_avg,
        ctx.head_to_head.home_wins as f64,
        ctx.head_to_head.away_wins as f64,
        ctx.home.win_streak as f64,
        ctx.away.win_streak as f64,
        ctx.home.rest_days.min(14) as f64,
        ctx.away.rest_days.min(14) as f64,
        if ctx.is_derby { 1.0 } else { 0.0 },
        if ctx.neutral_venue { 1.0 } else { 0.0 },
        weather.temperature,
        weather.precipitation,
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatPrediction {
    pub probabilities: OutcomeProbs,
    pub lambda_home: f64,
    pub lambda_away: f64,
    pub feature_importance: BTreeMap<String, f64>,
}

/// Fixed-coefficient Poisson model with post-hoc logit calibration.
#[derive(Debug, Clone)]
pub struct StatisticalModel {
    logit_scale: f64,
    draw_bias: f64,
}

impl StatisticalModel {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            logit_scale: config.stat_logit_scale,
            draw_bias: config.stat_draw_bias,
        }
    }

    pub fn predict(&self, ctx: &MatchContext) -> StatPrediction {
        let features = prepare_features(ctx);
        let contributions: Vec<f64> = features
            .iter()
            .zip(COEFFICIENTS)
            .map(|(x, c)| x * c)
            .collect();

        let home_adv = if ctx.neutral_venue { 0.0 } else { HOME_ADV_GOALS };
        let diff = home_adv + contributions.iter().sum::<f64>();

        let mut total = GOALS_TOTAL_BASE;
        let observed = ctx.home.goals_scored_avg
            + ctx.home.goals_conceded_avg
            + ctx.away.goals_scored_avg
            + ctx.away.goals_conceded_avg;
        if observed > 0.0 {
            total += TOTAL_SHRINK * (observed / 2.0 - GOALS_TOTAL_BASE);
        }
        if ctx.is_derby {
            total *= DERBY_TOTAL_FACTOR;
        }
        total *= 1.0 + WEATHER_TOTAL_FACTOR * ctx.weather_impact();
        let total = total.clamp(1.2, 4.5);

        let (lambda_home, lambda_away) = lambdas_from_diff(total, diff);
        let raw = ScoreGrid::poisson(lambda_home, lambda_away).outcome_probs();
        let probabilities = apply_logit_calibration(raw, self.logit_scale, self.draw_bias);

        let magnitude: f64 = contributions.iter().map(|c| c.abs()).sum();
        let feature_importance = FEATURE_COLUMNS
            .iter()
            .zip(&contributions)
            .map(|(name, c)| {
                let share = if magnitude > 0.0 { c.abs() / magnitude } else { 0.0 };
                (name.to_string(), share)
            })
            .collect();

        debug!(lambda_home, lambda_away, ?probabilities, "statistical model");
        StatPrediction {
            probabilities,
            lambda_home,
            lambda_away,
            feature_importance,
        }
    }
}

impl ForecastProvider for StatisticalModel {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn forecast(
        &self,
        ctx: &MatchContext,
        cancel: &CancelToken,
    ) -> Result<ForecastCandidate, ProviderError> {
        cancel.check()?;
        let pred = self.predict(ctx);
        let outcome = pred.probabilities.argmax();
        let score = ScoreGrid::poisson(pred.lambda_home, pred.lambda_away).most_likely(outcome);

        let mut ranked: Vec<(&String, &f64)> = pred.feature_importance.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let key_factors: Vec<String> = ranked
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .take(3)
            .map(|(name, _)| name.to_string())
            .collect();

        Ok(ForecastCandidate {
            predicted_outcome: Some(outcome.as_str().to_string()),
            score_prediction: Some(CandidateScore {
                home: Some(score.home as f64),
                away: Some(score.away as f64),
            }),
            confidence: Some(pred.probabilities.get(outcome)),
            reasoning: Some(reasoning(ctx, &pred, outcome)),
            key_factors: Some(key_factors),
            outcome_probabilities: Some(pred.probabilities),
            feature_importance: Some(pred.feature_importance),
        })
    }
}

fn reasoning(ctx: &MatchContext, pred: &StatPrediction, outcome: Outcome) -> Vec<String> {
    let mut out = vec![format!(
        "Expected goals {:.2} for {} and {:.2} for {}",
        pred.lambda_home, ctx.home.name, pred.lambda_away, ctx.away.name
    )];
    let gap = ctx.home.rating - ctx.away.rating;
    if gap.abs() >= 5.0 {
        let stronger = if gap > 0.0 { &ctx.home.name } else { &ctx.away.name };
        out.push(format!("{stronger} rated {:.0} points higher", gap.abs()));
    }
    out.push(format!(
        "Model favours {} at {:.0}%",
        outcome,
        pred.probabilities.get(outcome) * 100.0
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::validate_forecast;
    use crate::match_context::{HeadToHead, TeamSnapshot};

    fn ctx(home_rating: f64, away_rating: f64) -> MatchContext {
        MatchContext {
            match_id: "m".into(),
            competition: String::new(),
            kickoff: None,
            home: TeamSnapshot::new("Home", home_rating),
            away: TeamSnapshot::new("Away", away_rating),
            head_to_head: HeadToHead::default(),
            is_derby: false,
            neutral_venue: false,
            importance: Default::default(),
            attacking_style: Default::default(),
            attacking_factor: 0.0,
            weather: None,
        }
    }

    #[test]
    fn stronger_home_side_is_favoured() {
        let model = StatisticalModel::new(&EngineConfig::default());
        let p = model.predict(&ctx(85.0, 60.0)).probabilities;
        assert!(p.home_win > p.away_win);
        assert!((p.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn forecast_passes_validation() {
        let model = StatisticalModel::new(&EngineConfig::default());
        let candidate = model.forecast(&ctx(70.0, 72.0), &CancelToken::new()).unwrap();
        let f = validate_forecast(PROVIDER_ID, &candidate).unwrap();
        assert!(f.outcome_probabilities.is_some());
        assert_eq!(f.feature_importance.len(), FEATURE_COLUMNS.len());
    }
}
