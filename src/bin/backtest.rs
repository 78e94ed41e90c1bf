use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use matchday_edge::calibration::{calibration_bins, fit_logit_calibration};
use matchday_edge::config::EngineConfig;
use matchday_edge::forecast::ForecastCandidate;
use matchday_edge::ledger::stored_from_report;
use matchday_edge::match_context::MatchContext;
use matchday_edge::odds::OddsSnapshot;
use matchday_edge::outcome::{Outcome, OutcomeProbs, ScoreLine};
use matchday_edge::performance;
use matchday_edge::pipeline::{OddsInput, PredictionEngine, answered};
use matchday_edge::provider::{CancelToken, ForecastProvider};
use matchday_edge::settlement::{MatchResult, MatchStatus};
use matchday_edge::sport::SportRegistry;
use matchday_edge::stat_model::StatisticalModel;

const STAKE: f64 = 10.0;

#[derive(Debug, serde::Deserialize)]
struct BacktestCase {
    context: MatchContext,
    #[serde(default)]
    candidates: Vec<CaseCandidate>,
    #[serde(default)]
    odds: Option<OddsSnapshot>,
    #[serde(default)]
    status: Option<MatchStatus>,
    #[serde(default)]
    final_score: Option<ScoreLine>,
}

#[derive(Debug, serde::Deserialize)]
struct CaseCandidate {
    provider_id: String,
    forecast: ForecastCandidate,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,matchday_edge=info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/backtest_cases.json"));
    let with_model = args.iter().any(|a| a == "--with-model");

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cases: Vec<BacktestCase> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;

    let config = EngineConfig::from_env();
    let registry = SportRegistry::new(&config);
    let rules = registry.get("soccer")?;
    let model = StatisticalModel::new(&config);
    let engine = PredictionEngine::new(config, Vec::new());
    let now = Utc::now();

    let mut history = Vec::new();
    let mut probs: Vec<OutcomeProbs> = Vec::new();
    let mut outcomes: Vec<Outcome> = Vec::new();
    let mut skipped = 0usize;

    for case in &cases {
        let mut candidates: Vec<(String, ForecastCandidate)> = case
            .candidates
            .iter()
            .map(|c| (c.provider_id.clone(), c.forecast.clone()))
            .collect();
        if with_model {
            let forecast = model.forecast(&case.context, &CancelToken::new())?;
            candidates.push((model.id().to_string(), forecast));
        }

        let input = OddsInput {
            current: case.odds.as_ref(),
            previous: None,
        };
        let report = match engine.assemble(&case.context, answered(candidates), input) {
            Ok(r) => r,
            Err(err) => {
                warn!(match_id = %case.context.match_id, %err, "case skipped");
                skipped += 1;
                continue;
            }
        };

        let stored = stored_from_report(&report, STAKE);
        let result = MatchResult {
            match_id: case.context.match_id.clone(),
            status: case.status.unwrap_or(MatchStatus::Completed),
            score: case.final_score,
        };
        let settled = match rules.settle(&stored, &result, now) {
            Ok(s) => s,
            Err(err) => {
                warn!(match_id = %case.context.match_id, %err, "case not settled");
                skipped += 1;
                continue;
            }
        };

        if let Some(actual) = settled.actual_outcome {
            probs.push(report.ensemble.probabilities);
            outcomes.push(actual);
        }
        println!(
            "{:<14} {:<10} {:>5}  {:<9} {:<17} {:+7.2}",
            report.match_id,
            report.ensemble.outcome.as_str(),
            report.ensemble.score.to_string(),
            settled
                .actual_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            settled.status.as_str(),
            settled.profit_loss
        );
        history.push((stored, settled));
    }

    let summary = performance::summarize(&history);
    println!();
    println!("Cases: {} (skipped {})", cases.len(), skipped);
    println!(
        "Correct {}  partial {}  incorrect {}  void {}",
        summary.counts.correct,
        summary.counts.partially_correct,
        summary.counts.incorrect,
        summary.counts.void
    );
    println!("Accuracy: {:.1}%", summary.accuracy * 100.0);
    println!("Exact scores: {}", summary.exact_scores);
    println!("Points: {}", summary.points);
    println!(
        "P/L: {:+.2} on {:.2} staked (ROI {:+.1}%)",
        summary.profit_loss,
        summary.staked,
        summary.roi * 100.0
    );
    println!(
        "Streaks: best {} current {}",
        summary.best_streak, summary.current_streak
    );
    println!("Avg confidence: {:.3}", summary.average_confidence);
    let m = summary.probability_metrics;
    println!(
        "Brier {:.4}  log loss {:.4}  argmax acc {:.3} (n={})",
        m.brier, m.log_loss, m.accuracy, m.samples
    );

    if args.iter().any(|a| a == "--calibrate") && !probs.is_empty() {
        let (scale, draw_bias, fitted) = fit_logit_calibration(&probs, &outcomes);
        println!();
        println!(
            "Calibration: scale {:.2}  draw bias {:+.2}  log loss {:.4} -> {:.4}",
            scale, draw_bias, m.log_loss, fitted.log_loss
        );
        for bin in calibration_bins(&probs, &outcomes, Outcome::HomeWin, 5) {
            if bin.count == 0 {
                continue;
            }
            println!(
                "  home {:.1}-{:.1}: n={} pred {:.3} actual {:.3}",
                bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
            );
        }
    }

    Ok(())
}
