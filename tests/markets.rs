use std::fs;
use std::path::PathBuf;

use matchday_edge::config::ProviderWeights;
use matchday_edge::diagnostics;
use matchday_edge::ensemble::{EnsembleForecast, aggregate};
use matchday_edge::error::ValidationError;
use matchday_edge::forecast::RawForecast;
use matchday_edge::markets::{self, HandicapLine, parse_htft_code};
use matchday_edge::match_context::MatchContext;
use matchday_edge::outcome::{Outcome, ScoreLine};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn context() -> MatchContext {
    serde_json::from_str(&read_fixture("match_context.json")).expect("context fixture should parse")
}

fn ensemble(outcome: Outcome, home: u32, away: u32, confidence: f64) -> EnsembleForecast {
    let f = RawForecast {
        provider_id: "statistical".into(),
        predicted_outcome: outcome,
        score_prediction: ScoreLine::new(home, away),
        confidence,
        reasoning: vec!["fixture".into()],
        key_factors: Vec::new(),
        outcome_probabilities: None,
        feature_importance: Default::default(),
    };
    aggregate(&[f], &ProviderWeights::default()).expect("one valid forecast")
}

#[test]
fn every_market_decays_from_base_confidence() {
    let ctx = context();
    for (outcome, h, a) in [
        (Outcome::HomeWin, 3, 1),
        (Outcome::Draw, 0, 0),
        (Outcome::AwayWin, 1, 4),
    ] {
        for c in [0.0, 0.35, 0.72, 1.0] {
            let e = ensemble(outcome, h, a, c);
            let m = markets::generate(&e, &ctx);
            for (name, conf) in m.confidences() {
                assert!(conf <= e.confidence + 1e-12, "{name}: {conf} > {}", e.confidence);
                assert!(conf >= 0.0, "{name} negative");
            }
        }
    }
}

#[test]
fn totals_follow_the_combined_score() {
    let m = markets::generate(&ensemble(Outcome::HomeWin, 2, 1, 0.8), &context());
    assert_eq!(m.over_under.total, 3);
    assert!(m.over_under.over_1_5 && m.over_under.over_2_5 && !m.over_under.over_3_5);
    assert!(m.btts.prediction);
    assert_eq!(m.first_half.home, 1);
    assert_eq!(m.first_half.away, 0);
    assert!((m.over_under.confidence - 0.72).abs() < 1e-12);
    assert!((m.btts.confidence - 0.68).abs() < 1e-12);
    assert!((m.first_half.confidence - 0.56).abs() < 1e-12);
}

#[test]
fn derby_context_books_red_cards_and_wing_play_adds_corners() {
    let ctx = context();
    let m = markets::generate(&ensemble(Outcome::HomeWin, 2, 1, 0.8), &ctx);
    assert!(m.corners.total > 10);
    assert_eq!(m.corners.home + m.corners.away, m.corners.total);
    assert!(m.cards.red >= 1);
    assert_eq!(m.cards.yellow + m.cards.red, m.cards.total);
    assert_eq!(m.possession.home + m.possession.away, 100);
    assert!(m.possession.home > m.possession.away);
}

#[test]
fn handicap_lines_are_restricted() {
    for line in HandicapLine::ALL {
        assert!(HandicapLine::new(line).is_ok(), "{line} should be accepted");
    }
    for line in [-2.5, -0.25, 0.75, 3.0, f64::NAN] {
        assert!(HandicapLine::new(line).is_err(), "{line} should be rejected");
    }

    let m = markets::generate(&ensemble(Outcome::HomeWin, 2, 0, 0.7), &context());
    assert_eq!(m.asian_handicap.len(), 9);
    assert!(m.handicap(-1.5).is_ok());
    assert_eq!(
        m.handicap(0.25).unwrap_err(),
        ValidationError::InvalidHandicapLine(0.25)
    );
    let bad: Result<HandicapLine, _> = serde_json::from_str("0.75");
    assert!(bad.is_err());
}

#[test]
fn halftime_fulltime_is_a_distribution() {
    let m = markets::generate(&ensemble(Outcome::Draw, 1, 1, 0.6), &context());
    let total: f64 = m.halftime_fulltime.probabilities.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(m.halftime_fulltime.probabilities.len(), 9);
    assert!(m.halftime_fulltime.probability("DD").is_ok());
    assert_eq!(
        parse_htft_code("HX"),
        Err(ValidationError::InvalidCombination("HX".into()))
    );
    assert!(m.halftime_fulltime.probability("HDA").is_err());
}

#[test]
fn diagnostics_intervals_are_floored_and_similarities_bounded() {
    let m = markets::generate(&ensemble(Outcome::AwayWin, 0, 1, 0.2), &context());
    let d = diagnostics::analyze(&m);
    assert_eq!(d.confidence_intervals.len(), m.numeric().len());
    for ci in d.confidence_intervals.values() {
        assert!(ci.lower_bound >= 0.0);
        assert!(ci.upper_bound >= ci.lower_bound);
    }
    for (pair, s) in &d.correlations {
        assert!((-1.0..=1.0).contains(s), "{pair} = {s}");
    }
}
