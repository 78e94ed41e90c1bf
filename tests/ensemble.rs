use matchday_edge::config::ProviderWeights;
use matchday_edge::ensemble::{Caveat, RiskLevel, aggregate, confidence_multiplier, dynamic_weights};
use matchday_edge::error::PredictError;
use matchday_edge::forecast::RawForecast;
use matchday_edge::outcome::{Outcome, ScoreLine};

fn forecast(id: &str, outcome: Outcome, home: u32, away: u32, confidence: f64) -> RawForecast {
    RawForecast {
        provider_id: id.to_string(),
        predicted_outcome: outcome,
        score_prediction: ScoreLine::new(home, away),
        confidence,
        reasoning: vec![format!("{id} reasoning")],
        key_factors: Vec::new(),
        outcome_probabilities: None,
        feature_importance: Default::default(),
    }
}

#[test]
fn two_agreeing_providers_blend_by_confidence() {
    let priors = ProviderWeights::new([("a", 0.5), ("b", 0.5)]);
    let fs = [
        forecast("a", Outcome::HomeWin, 2, 1, 0.8),
        forecast("b", Outcome::HomeWin, 1, 1, 0.6),
    ];

    let weights = dynamic_weights(&fs, &priors);
    assert!((weights[0] - 4.0 / 7.0).abs() < 1e-9);
    assert!((weights[1] - 3.0 / 7.0).abs() < 1e-9);

    let e = aggregate(&fs, &priors).expect("two valid forecasts");
    assert_eq!(e.outcome, Outcome::HomeWin);
    assert_eq!(e.score, ScoreLine::new(2, 1));
    assert!((e.expected_home_goals - 11.0 / 7.0).abs() < 1e-9);
    assert!((e.confidence - 5.0 / 7.0).abs() < 1e-9);
    assert!(e.model_agreement);
    // home variance 0.25, away 0 -> 1 / 1.125
    assert_eq!(e.consistency, 0.89);
    // mean confidence 0.7 keeps this out of the low band
    assert_eq!(e.risk, RiskLevel::Medium);
    assert!((e.probabilities.sum() - 1.0).abs() < 1e-9);
}

#[test]
fn single_confident_provider_is_fully_consistent() {
    let priors = ProviderWeights::default();
    let e = aggregate(&[forecast("statistical", Outcome::Draw, 1, 1, 0.9)], &priors).unwrap();
    assert_eq!(e.consistency, 1.0);
    assert_eq!(e.uncertainty.distinct_outcomes, 1);
    assert_eq!(e.uncertainty.confidence_std, 0.0);
    assert_eq!(e.risk, RiskLevel::Low);
    assert_eq!(e.caveats, vec![Caveat::SingleProvider]);
}

#[test]
fn no_forecasts_is_not_a_default_prediction() {
    assert_eq!(
        aggregate(&[], &ProviderWeights::default()),
        Err(PredictError::NoForecasts)
    );
}

#[test]
fn multiplier_stays_within_floor_and_ceiling() {
    for step in 0..=100 {
        let c = step as f64 / 100.0;
        let m = confidence_multiplier(c);
        assert!((0.5..=1.0).contains(&m), "c={c} m={m}");
    }
}

#[test]
fn mass_sums_to_one_for_mixed_sets() {
    let priors = ProviderWeights::default();
    let sets: Vec<Vec<RawForecast>> = vec![
        vec![
            forecast("statistical", Outcome::HomeWin, 2, 0, 0.7),
            forecast("gpt4", Outcome::Draw, 1, 1, 0.4),
            forecast("deepseek", Outcome::AwayWin, 0, 1, 1.0),
        ],
        vec![
            forecast("statistical", Outcome::AwayWin, 0, 3, 0.0),
            forecast("unknown", Outcome::AwayWin, 1, 2, 0.55),
        ],
    ];
    for fs in &sets {
        let e = aggregate(fs, &priors).unwrap();
        assert!((e.probabilities.sum() - 1.0).abs() < 1e-9);
        let wsum: f64 = e.contributions.iter().map(|c| c.weight).sum();
        assert!((wsum - 1.0).abs() < 1e-9);
    }
}

#[test]
fn disagreement_is_flagged_and_consistency_drops() {
    let priors = ProviderWeights::default();
    let fs = [
        forecast("statistical", Outcome::HomeWin, 2, 1, 0.6),
        forecast("gpt4", Outcome::AwayWin, 1, 2, 0.6),
    ];
    let e = aggregate(&fs, &priors).unwrap();
    assert!(!e.model_agreement);
    assert!(e.caveats.contains(&Caveat::ModelDisagreement));
    assert!(e.consistency <= 0.5);
    assert_eq!(e.outcome, Outcome::HomeWin);
}

#[test]
fn identical_inputs_give_identical_output() {
    let priors = ProviderWeights::default();
    let fs = [
        forecast("statistical", Outcome::HomeWin, 3, 1, 0.66),
        forecast("gpt4", Outcome::Draw, 1, 1, 0.52),
    ];
    assert_eq!(aggregate(&fs, &priors), aggregate(&fs, &priors));
}
