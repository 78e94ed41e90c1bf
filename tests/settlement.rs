use chrono::{TimeZone, Utc};

use matchday_edge::config::EngineConfig;
use matchday_edge::error::{SettlementError, SportError};
use matchday_edge::outcome::{Outcome, ScoreLine};
use matchday_edge::settlement::{
    MarketPick, MatchResult, MatchStatus, SettlementStatus, StoredPrediction, resettle, settle,
};
use matchday_edge::sport::SportRegistry;

fn prediction() -> StoredPrediction {
    StoredPrediction {
        id: "pred-1".into(),
        match_id: "m-1".into(),
        predicted_outcome: Outcome::HomeWin,
        predicted_score: Some(ScoreLine::new(2, 1)),
        confidence: 0.71,
        probabilities: None,
        stake: 10.0,
        odds: None,
        potential_return: Some(21.0),
        picks: vec![MarketPick::TotalGoals {
            line: 2.5,
            over: true,
        }],
    }
}

fn result(status: MatchStatus, score: Option<(u32, u32)>) -> MatchResult {
    MatchResult {
        match_id: "m-1".into(),
        status,
        score: score.map(|(h, a)| ScoreLine::new(h, a)),
    }
}

#[test]
fn exact_hit_is_correct_with_full_accuracy() {
    let at = Utc.with_ymd_and_hms(2026, 11, 22, 18, 30, 0).unwrap();
    let s = settle(&prediction(), &result(MatchStatus::Completed, Some((2, 1))), 10, at).unwrap();
    assert_eq!(s.status, SettlementStatus::Correct);
    assert!((s.profit_loss - 11.0).abs() < 1e-9);
    assert_eq!(s.points_earned, 15);
    assert!(s.metrics.exact_score);
    assert_eq!(s.metrics.score_accuracy, Some(1.0));
    assert_eq!(s.metrics.goal_difference_accuracy, Some(1.0));
    assert_eq!(s.actual_outcome, Some(Outcome::HomeWin));
    assert_eq!(s.settled_at, at);
}

#[test]
fn wrong_outcome_loses_the_stake() {
    let s = settle(
        &prediction(),
        &result(MatchStatus::Completed, Some((0, 1))),
        10,
        Utc::now(),
    )
    .unwrap();
    assert_eq!(s.status, SettlementStatus::Incorrect);
    assert_eq!(s.profit_loss, -10.0);
    assert_eq!(s.points_earned, 0);
    // |2-0| + |1-1| = 2 -> 1 - 2/10
    assert_eq!(s.metrics.score_accuracy, Some(0.8));
}

#[test]
fn postponed_match_is_void() {
    let s = settle(&prediction(), &result(MatchStatus::Postponed, None), 10, Utc::now()).unwrap();
    assert_eq!(s.status, SettlementStatus::Void);
    assert_eq!(s.profit_loss, 0.0);
    assert_eq!(s.actual_score, None);
}

#[test]
fn missing_data_is_a_hard_error() {
    assert_eq!(
        settle(&prediction(), &result(MatchStatus::Completed, None), 10, Utc::now()),
        Err(SettlementError::MissingScore("m-1".into()))
    );
    let mut other = result(MatchStatus::Completed, Some((1, 0)));
    other.match_id = "m-2".into();
    assert!(matches!(
        settle(&prediction(), &other, 10, Utc::now()),
        Err(SettlementError::MatchMismatch { .. })
    ));
    assert!(matches!(
        settle(&prediction(), &result(MatchStatus::Scheduled, None), 10, Utc::now()),
        Err(SettlementError::NotCompleted(_))
    ));
}

#[test]
fn resettling_with_same_result_is_idempotent() {
    let p = prediction();
    let r = result(MatchStatus::Completed, Some((3, 1)));
    let first = settle(&p, &r, 10, Utc::now()).unwrap();
    for _ in 0..3 {
        let again = resettle(&first, &p, &r, 10).unwrap();
        assert_eq!(again.status, first.status);
        assert_eq!(again.profit_loss.to_bits(), first.profit_loss.to_bits());
        assert_eq!(again.points_earned, first.points_earned);
        assert_eq!(again.settled_at, first.settled_at);
    }

    let conflicting = result(MatchStatus::Completed, Some((1, 1)));
    assert!(matches!(
        resettle(&first, &p, &conflicting, 10),
        Err(SettlementError::ConflictingResult { .. })
    ));
}

#[test]
fn registry_routes_settlement_by_sport_code() {
    let config = EngineConfig::default();
    let registry = SportRegistry::new(&config);
    assert_eq!(registry.codes().collect::<Vec<_>>(), vec!["soccer"]);

    let rules = registry.get("Football").expect("alias for soccer");
    let s = rules
        .settle(
            &prediction(),
            &result(MatchStatus::Completed, Some((2, 1))),
            Utc::now(),
        )
        .unwrap();
    assert_eq!(s.points_earned, config.points_per_correct + config.points_per_correct / 2);

    assert_eq!(
        registry.get("curling").err(),
        Some(SportError::Unsupported("curling".into()))
    );
}
