use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use matchday_edge::config::EngineConfig;
use matchday_edge::ledger::Ledger;
use matchday_edge::match_context::MatchContext;
use matchday_edge::odds::OddsSnapshot;
use matchday_edge::outcome::Outcome;
use matchday_edge::pipeline::{OddsInput, PredictionEngine, PredictionReport, ProviderState};
use matchday_edge::provider::CancelToken;

const DEFAULT_STAKE: f64 = 10.0;
const USAGE: &str = "usage: matchday_edge <context.json> [--odds FILE] [--previous-odds FILE] \
                     [--json] [--offline] [--save] [--stake N] [--db FILE]";

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
    let context_path = positional_after_flags(&args).ok_or_else(|| anyhow!(USAGE))?;

    let ctx: MatchContext = read_json(&context_path)?;
    let odds: Option<OddsSnapshot> = flag_value(&args, "--odds")
        .map(|p| read_json(Path::new(&p)))
        .transpose()?;
    let previous: Option<OddsSnapshot> = flag_value(&args, "--previous-odds")
        .map(|p| read_json(Path::new(&p)))
        .transpose()?;

    let config = EngineConfig::from_env();
    let offline = has_flag(&args, "--offline");
    let engine = PredictionEngine::with_default_providers(config, offline);
    info!(providers = ?engine.provider_ids(), "engine ready");

    let input = OddsInput {
        current: odds.as_ref(),
        previous: previous.as_ref(),
    };
    let report = engine.predict(&ctx, input, &CancelToken::new())?;

    if has_flag(&args, "--json") {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("encode report")?
        );
    } else {
        print_report(&report);
    }

    if has_flag(&args, "--save") {
        let db_path = flag_value(&args, "--db")
            .map(PathBuf::from)
            .or_else(|| engine.config().ledger_path.clone())
            .context("unable to resolve ledger path")?;
        let stake = flag_value(&args, "--stake")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or(DEFAULT_STAKE);
        let ledger = Ledger::open(&db_path)?;
        let stored = ledger.record_report(&report, stake)?;
        eprintln!("saved prediction {} to {}", stored.id, db_path.display());
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
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

const VALUE_FLAGS: [&str; 4] = ["--odds", "--previous-odds", "--db", "--stake"];

fn positional_after_flags(args: &[String]) -> Option<PathBuf> {
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
            return Some(PathBuf::from(arg));
        }
    }
    None
}

fn print_report(report: &PredictionReport) {
    let e = &report.ensemble;
    println!("{} vs {}  ({})", report.home, report.away, report.match_id);
    println!();
    println!(
        "Prediction: {}  {}  confidence {:.1}%  risk {}",
        label(e.outcome, report),
        e.score,
        e.confidence * 100.0,
        e.risk.as_str()
    );
    println!(
        "Mass: home {:.1}%  draw {:.1}%  away {:.1}%",
        e.probabilities.home_win * 100.0,
        e.probabilities.draw * 100.0,
        e.probabilities.away_win * 100.0
    );
    println!(
        "Consistency {:.2}  agreement {}  xG {:.2}-{:.2}",
        e.consistency,
        if e.model_agreement { "yes" } else { "no" },
        e.expected_home_goals,
        e.expected_away_goals
    );

    println!();
    println!("Providers:");
    for p in &report.providers {
        let state = match p.state {
            ProviderState::Accepted => "ok",
            ProviderState::Rejected => "rejected",
            ProviderState::Failed => "failed",
        };
        let weight = e
            .contributions
            .iter()
            .find(|c| c.provider_id == p.provider_id)
            .map(|c| format!("w={:.3}", c.weight))
            .unwrap_or_default();
        match &p.reason {
            Some(reason) => println!(
                "  {:<12} {:<9} {}ms  {}",
                p.provider_id, state, p.elapsed_ms, reason
            ),
            None => println!(
                "  {:<12} {:<9} {}ms  {}",
                p.provider_id, state, p.elapsed_ms, weight
            ),
        }
    }

    let m = &report.markets;
    println!();
    println!("Markets:");
    println!(
        "  goals {}  over 2.5 {} ({:.0}%)  btts {} ({:.0}%)",
        m.over_under.total,
        yes_no(m.over_under.over_2_5),
        m.over_under.over_2_5_probability * 100.0,
        yes_no(m.btts.prediction),
        m.btts.probability * 100.0
    );
    println!(
        "  first half {}-{}  corners {} ({}-{})  cards {} ({} red)",
        m.first_half.home,
        m.first_half.away,
        m.corners.total,
        m.corners.home,
        m.corners.away,
        m.cards.total,
        m.cards.red
    );
    println!(
        "  possession {}%-{}%  shots {} ({} on target)",
        m.possession.home, m.possession.away, m.shots.total, m.shots.on_target
    );
    println!(
        "  ht/ft {}  draw no bet {} ({:.0}%)",
        m.halftime_fulltime.most_likely,
        label(m.draw_no_bet.pick, report),
        m.draw_no_bet.probability * 100.0
    );
    for ah in m.asian_handicap.iter().filter(|h| h.recommended) {
        println!(
            "  handicap {} {:.0}% (push {:.0}%)",
            ah.line,
            ah.probability * 100.0,
            ah.push_probability * 100.0
        );
    }

    if let Some(v) = &report.value {
        println!();
        println!("Value:");
        for o in &v.outcomes {
            let Some(odds) = o.odds else {
                println!("  {:<10} no price", label(o.outcome, report));
                continue;
            };
            println!(
                "  {:<10} @ {:.2}  model {:.1}%  implied {:.1}%  edge {:+.1}%",
                label(o.outcome, report),
                odds,
                o.model_probability * 100.0,
                o.implied_probability.unwrap_or(0.0) * 100.0,
                o.edge.unwrap_or(0.0) * 100.0
            );
        }
        match v.best_bet {
            Some(best) if v.has_value() => println!(
                "  best bet {}  kelly {:.1}%  rating {:.2}",
                label(best, report),
                v.kelly_fraction * 100.0,
                v.value_rating
            ),
            _ => println!("  no value found"),
        }
        if let Some(eff) = v.market_efficiency {
            println!("  market efficiency {:.3}", eff);
        }
        for mv in v.movements.iter().filter(|m| m.significant) {
            println!(
                "  {} moved {:.2} -> {:.2} ({:+.0}%)",
                label(mv.outcome, report),
                mv.previous,
                mv.current,
                mv.change * 100.0
            );
        }
        for issue in &v.issues {
            println!("  note: {issue:?}");
        }
    }

    if !report.caveats.is_empty() {
        println!();
        for c in &report.caveats {
            println!("caveat: {c:?}");
        }
    }
}

fn label(outcome: Outcome, report: &PredictionReport) -> String {
    match outcome {
        Outcome::HomeWin => report.home.clone(),
        Outcome::AwayWin => report.away.clone(),
        Outcome::Draw => "Draw".to_string(),
    }
}

fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}
