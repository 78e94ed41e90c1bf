use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use matchday_edge::config::EngineConfig;
use matchday_edge::ledger::Ledger;
use matchday_edge::outcome::ScoreLine;
use matchday_edge::performance;
use matchday_edge::settlement::{MatchResult, MatchStatus};
use matchday_edge::sport::SportRegistry;

const USAGE: &str = "usage: settle <prediction-id> (<home>-<away> | --status cancelled|postponed) \
                     [--sport CODE] [--db FILE] | settle --pending | settle --summary";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,matchday_edge=debug")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = EngineConfig::from_env();
    let db_path = flag_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.ledger_path.clone())
        .context("unable to resolve ledger path")?;
    let ledger = Ledger::open(&db_path)?;

    if args.iter().any(|a| a == "--pending") {
        for id in ledger.pending_ids()? {
            println!("{id}");
        }
        return Ok(());
    }
    if args.iter().any(|a| a == "--summary") {
        let summary = performance::summarize(&ledger.settled_history()?);
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("encode summary")?
        );
        return Ok(());
    }

    let positional = positionals(&args);
    let id = positional.first().ok_or_else(|| anyhow!(USAGE))?;
    let prediction = ledger
        .load_prediction(id)?
        .ok_or_else(|| anyhow!("no stored prediction with id {id}"))?;

    let result = match flag_value(&args, "--status") {
        Some(raw) => {
            let status =
                MatchStatus::parse(&raw).ok_or_else(|| anyhow!("unknown match status {raw}"))?;
            MatchResult {
                match_id: prediction.match_id.clone(),
                status,
                score: None,
            }
        }
        None => {
            let raw = positional.get(1).ok_or_else(|| anyhow!(USAGE))?;
            MatchResult {
                match_id: prediction.match_id.clone(),
                status: MatchStatus::Completed,
                score: Some(parse_score(raw)?),
            }
        }
    };

    let registry = SportRegistry::new(&config);
    let sport = flag_value(&args, "--sport").unwrap_or_else(|| "soccer".to_string());
    let rules = registry.get(&sport)?;

    let settled = ledger.record_settlement(rules, id, &result, Utc::now())?;
    println!("Prediction: {}", settled.prediction_id);
    println!("Status: {}", settled.status.as_str());
    if let Some(score) = settled.actual_score {
        println!("Score: {score}");
    }
    println!("Profit/loss: {:+.2}", settled.profit_loss);
    println!("Points: {}", settled.points_earned);
    if let Some(acc) = settled.metrics.score_accuracy {
        println!("Score accuracy: {:.2}", acc);
    }
    Ok(())
}

fn parse_score(raw: &str) -> Result<ScoreLine> {
    let (h, a) = raw
        .trim()
        .split_once(['-', ':'])
        .ok_or_else(|| anyhow!("score must look like 2-1, got {raw}"))?;
    let home = h.trim().parse::<u32>().with_context(|| format!("home goals in {raw}"))?;
    let away = a.trim().parse::<u32>().with_context(|| format!("away goals in {raw}"))?;
    Ok(ScoreLine::new(home, away))
}

const VALUE_FLAGS: [&str; 3] = ["--db", "--status", "--sport"];

fn positionals(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip = true;
            continue;
        }
        if !arg.starts_with("--") {
            out.push(arg.clone());
        }
    }
    out
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix) {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.clone());
        }
    }
    None
}
