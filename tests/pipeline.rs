use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use matchday_edge::config::EngineConfig;
use matchday_edge::ensemble::Caveat;
use matchday_edge::error::{PredictError, ProviderError};
use matchday_edge::forecast::ForecastCandidate;
use matchday_edge::ledger::Ledger;
use matchday_edge::match_context::MatchContext;
use matchday_edge::odds::OddsSnapshot;
use matchday_edge::outcome::{Outcome, ScoreLine};
use matchday_edge::performance;
use matchday_edge::pipeline::{OddsInput, PredictionEngine, ProviderState, answered};
use matchday_edge::provider::{CancelToken, ForecastProvider};
use matchday_edge::settlement::{MatchResult, MatchStatus, SettlementStatus};
use matchday_edge::sport::SportRegistry;
use matchday_edge::stat_model::StatisticalModel;
use matchday_edge::synthetic::SyntheticProvider;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[derive(serde::Deserialize)]
struct Reply {
    provider_id: String,
    forecast: ForecastCandidate,
}

fn context() -> MatchContext {
    serde_json::from_str(&read_fixture("match_context.json")).expect("context fixture should parse")
}

fn replies() -> Vec<(String, ForecastCandidate)> {
    let raw: Vec<Reply> =
        serde_json::from_str(&read_fixture("provider_replies.json")).expect("replies should parse");
    raw.into_iter().map(|r| (r.provider_id, r.forecast)).collect()
}

fn odds() -> OddsSnapshot {
    serde_json::from_str(&read_fixture("odds.json")).expect("odds fixture should parse")
}

#[test]
fn invalid_reply_is_excluded_and_flagged_partial() {
    let engine = PredictionEngine::new(EngineConfig::default(), Vec::new());
    let odds = odds();
    let report = engine
        .assemble(&context(), answered(replies()), OddsInput::current(&odds))
        .expect("two providers survive validation");

    let states: Vec<(&str, ProviderState)> = report
        .providers
        .iter()
        .map(|p| (p.provider_id.as_str(), p.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("statistical", ProviderState::Accepted),
            ("gpt4", ProviderState::Accepted),
            ("deepseek", ProviderState::Rejected),
        ]
    );
    assert!(report.providers[2].reason.as_deref().unwrap_or("").contains("1.4"));

    let e = &report.ensemble;
    assert_eq!(e.outcome, Outcome::HomeWin);
    assert_eq!(e.score, ScoreLine::new(2, 1));
    assert_eq!(e.contributions.len(), 2);
    // "Strong recent form" appears in both replies
    assert_eq!(
        e.reasoning.iter().filter(|r| r.as_str() == "Strong recent form").count(),
        1
    );
    assert!(report.caveats.contains(&Caveat::PartialProviderSet));

    let value = report.value.as_ref().expect("odds were supplied");
    assert_eq!(value.best_bet, Some(Outcome::HomeWin));
    assert!((0.0..=0.10).contains(&value.kelly_fraction));
    assert!(!report.diagnostics.confidence_intervals.is_empty());
}

#[test]
fn nothing_valid_is_unavailable_not_a_guess() {
    let engine = PredictionEngine::new(EngineConfig::default(), Vec::new());
    let only_bad: Vec<(String, ForecastCandidate)> = replies()
        .into_iter()
        .filter(|(id, _)| id == "deepseek")
        .collect();
    let err = engine
        .assemble(&context(), answered(only_bad), OddsInput::default())
        .unwrap_err();
    assert_eq!(
        err,
        PredictError::Unavailable {
            requested: 1,
            failed: 1
        }
    );
}

struct Stalled;

impl ForecastProvider for Stalled {
    fn id(&self) -> &str {
        "stalled"
    }

    fn forecast(
        &self,
        _ctx: &MatchContext,
        cancel: &CancelToken,
    ) -> Result<ForecastCandidate, ProviderError> {
        for _ in 0..200 {
            cancel.check()?;
            thread::sleep(Duration::from_millis(10));
        }
        Err(ProviderError::Http("never answers in time".into()))
    }
}

#[test]
fn timed_out_provider_is_treated_like_a_rejected_one() {
    let config = EngineConfig::from_lookup(|key| match key {
        "PROVIDER_TIMEOUT_SECS" => Some("1".to_string()),
        _ => None,
    });
    let providers: Vec<Arc<dyn ForecastProvider>> = vec![
        Arc::new(StatisticalModel::new(&config)),
        Arc::new(Stalled),
    ];
    let engine = PredictionEngine::new(config, providers);
    let report = engine
        .predict(&context(), OddsInput::default(), &CancelToken::new())
        .expect("statistical model always answers");

    assert_eq!(report.providers.len(), 2);
    let stalled = report
        .providers
        .iter()
        .find(|p| p.provider_id == "stalled")
        .unwrap();
    assert_eq!(stalled.state, ProviderState::Failed);
    assert!(report.caveats.contains(&Caveat::PartialProviderSet));
    assert!(report.caveats.contains(&Caveat::SingleProvider));
    assert!(report.value.is_none());
}

#[test]
fn keyless_online_engine_runs_statistical_model_alone() {
    let engine = PredictionEngine::with_default_providers(EngineConfig::default(), false);
    assert_eq!(engine.provider_ids(), vec!["statistical"]);

    let ai_off = EngineConfig::from_lookup(|key| match key {
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        "AI_PREDICTION_ENABLED" => Some("off".to_string()),
        _ => None,
    });
    let engine = PredictionEngine::with_default_providers(ai_off, false);
    assert_eq!(engine.provider_ids(), vec!["statistical"]);

    let report = engine
        .predict(&context(), OddsInput::default(), &CancelToken::new())
        .unwrap();
    assert_eq!(report.providers.len(), 1);
    assert_eq!(report.providers[0].provider_id, "statistical");
    assert!(report.caveats.contains(&Caveat::SingleProvider));
}

#[test]
fn batch_prediction_is_deterministic_offline() {
    let config = EngineConfig::default();
    let engine = PredictionEngine::with_default_providers(config, true);
    assert_eq!(engine.provider_ids(), vec!["statistical", "synthetic"]);

    let mut second = context();
    second.match_id = "epl-2026-che-liv".into();
    let jobs = vec![(context(), Some(odds())), (second, None)];

    let first_run = engine.predict_many(&jobs);
    let second_run = engine.predict_many(&jobs);
    assert_eq!(first_run.len(), 2);
    for (a, b) in first_run.iter().zip(&second_run) {
        let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
        assert_eq!(a.ensemble, b.ensemble);
        assert_eq!(a.markets, b.markets);
    }
    assert!(first_run[0].as_ref().unwrap().value.is_some());
    assert!(first_run[1].as_ref().unwrap().value.is_none());
}

#[test]
fn report_round_trips_through_ledger_and_settlement() {
    let config = EngineConfig::default();
    let registry = SportRegistry::new(&config);
    let rules = registry.get("soccer").unwrap();
    let providers: Vec<Arc<dyn ForecastProvider>> = vec![
        Arc::new(StatisticalModel::new(&config)),
        Arc::new(SyntheticProvider::new("gpt4", 11)),
    ];
    let engine = PredictionEngine::new(config, providers);
    let odds = odds();
    let report = engine
        .predict(&context(), OddsInput::current(&odds), &CancelToken::new())
        .unwrap();

    let ledger = Ledger::in_memory().unwrap();
    let stored = ledger.record_report(&report, 10.0).unwrap();
    let loaded = ledger.load_prediction(&stored.id).unwrap().expect("stored");
    assert_eq!(loaded.match_id, report.match_id);
    assert_eq!(loaded.predicted_outcome, report.ensemble.outcome);
    assert_eq!(loaded.predicted_score, Some(report.ensemble.score));
    assert_eq!(loaded.picks, stored.picks);
    assert_eq!(stored.odds, Some(odds.consensus().get(stored.predicted_outcome).unwrap()));

    let final_score = match stored.predicted_outcome {
        Outcome::HomeWin => ScoreLine::new(2, 0),
        Outcome::Draw => ScoreLine::new(1, 1),
        Outcome::AwayWin => ScoreLine::new(0, 2),
    };
    let result = MatchResult {
        match_id: report.match_id.clone(),
        status: MatchStatus::Completed,
        score: Some(final_score),
    };
    let settled = ledger
        .record_settlement(rules, &stored.id, &result, Utc::now())
        .unwrap();
    assert_ne!(settled.status, SettlementStatus::Incorrect);
    assert!(settled.profit_loss > 0.0);

    let again = ledger
        .record_settlement(rules, &stored.id, &result, Utc::now())
        .unwrap();
    assert_eq!(again.status, settled.status);
    assert_eq!(again.points_earned, settled.points_earned);
    assert_eq!(again.settled_at, settled.settled_at);
    assert!((again.profit_loss - settled.profit_loss).abs() < 1e-9);

    let summary = performance::summarize(&ledger.settled_history().unwrap());
    assert_eq!(summary.total, 1);
    assert_eq!(summary.accuracy, 1.0);
    assert_eq!(summary.best_streak, 1);
}
