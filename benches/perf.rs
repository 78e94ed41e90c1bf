use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use matchday_edge::config::{EngineConfig, ProviderWeights};
use matchday_edge::ensemble::aggregate;
use matchday_edge::forecast::RawForecast;
use matchday_edge::markets;
use matchday_edge::match_context::MatchContext;
use matchday_edge::odds::OddsSnapshot;
use matchday_edge::outcome::{Outcome, ScoreLine};
use matchday_edge::pipeline::{OddsInput, PredictionEngine, answered};
use matchday_edge::provider::{CancelToken, ForecastProvider};
use matchday_edge::stat_model::StatisticalModel;
use matchday_edge::synthetic::SyntheticProvider;

fn context() -> MatchContext {
    serde_json::from_str(CONTEXT_JSON).expect("valid bench context")
}

fn forecasts() -> Vec<RawForecast> {
    [
        ("statistical", Outcome::HomeWin, 2, 1, 0.74),
        ("gpt4", Outcome::HomeWin, 1, 1, 0.61),
        ("deepseek", Outcome::Draw, 1, 1, 0.55),
    ]
    .into_iter()
    .map(|(id, outcome, h, a, c)| RawForecast {
        provider_id: id.to_string(),
        predicted_outcome: outcome,
        score_prediction: ScoreLine::new(h, a),
        confidence: c,
        reasoning: vec![format!("{id} reasoning")],
        key_factors: vec!["form".to_string()],
        outcome_probabilities: None,
        feature_importance: Default::default(),
    })
    .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let fs = forecasts();
    let priors = ProviderWeights::default();
    c.bench_function("ensemble_aggregate", |b| {
        b.iter(|| {
            let e = aggregate(black_box(&fs), &priors).unwrap();
            black_box(e.confidence);
        })
    });
}

fn bench_markets(c: &mut Criterion) {
    let ctx = context();
    let e = aggregate(&forecasts(), &ProviderWeights::default()).unwrap();
    c.bench_function("derived_markets", |b| {
        b.iter(|| {
            let m = markets::generate(black_box(&e), &ctx);
            black_box(m.asian_handicap.len());
        })
    });
}

fn bench_assemble(c: &mut Criterion) {
    let ctx = context();
    let config = EngineConfig::default();
    let stat = StatisticalModel::new(&config);
    let synth = SyntheticProvider::new("gpt4", 7);
    let token = CancelToken::new();
    let candidates = vec![
        (stat.id().to_string(), stat.forecast(&ctx, &token).unwrap()),
        (synth.id().to_string(), synth.forecast(&ctx, &token).unwrap()),
    ];
    let odds = OddsSnapshot::single("book", 2.10, 3.40, 3.80);
    let engine = PredictionEngine::new(config, Vec::new());

    c.bench_function("assemble_report", |b| {
        b.iter(|| {
            let report = engine
                .assemble(
                    &ctx,
                    answered(black_box(candidates.clone())),
                    OddsInput::current(&odds),
                )
                .unwrap();
            black_box(report.ensemble.outcome);
        })
    });
}

fn bench_stat_model(c: &mut Criterion) {
    let ctx = context();
    let model = StatisticalModel::new(&EngineConfig::default());
    c.bench_function("statistical_model", |b| {
        b.iter(|| {
            let p = model.predict(black_box(&ctx));
            black_box(p.probabilities.home_win);
        })
    });
}

criterion_group!(
    perf,
    bench_aggregate,
    bench_markets,
    bench_assemble,
    bench_stat_model
);
criterion_main!(perf);

static CONTEXT_JSON: &str = include_str!("../tests/fixtures/match_context.json");
