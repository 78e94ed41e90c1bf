use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::diagnostics::{self, Diagnostics};
use crate::ensemble::{self, Caveat, EnsembleForecast};
use crate::error::{PredictError, ProviderError};
use crate::forecast::{ForecastCandidate, admit_forecasts};
use crate::llm_provider::ChatForecaster;
use crate::markets::{self, DerivedMarkets};
use crate::match_context::MatchContext;
use crate::odds::OddsSnapshot;
use crate::provider::{CancelToken, ForecastProvider, ProviderOutcome, gather_forecasts};
use crate::stat_model::StatisticalModel;
use crate::synthetic::SyntheticProvider;
use crate::value::{ValueAnalyzer, ValueAssessment};

const SYNTHETIC_SEED: u64 = 2026;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Accepted,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub provider_id: String,
    pub state: ProviderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub elapsed_ms: u64,
}

/// Everything one prediction request produces, in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub match_id: String,
    pub home: String,
    pub away: String,
    pub generated_at: DateTime<Utc>,
    pub ensemble: EnsembleForecast,
    pub markets: DerivedMarkets,
    pub diagnostics: Diagnostics,
    pub value: Option<ValueAssessment>,
    pub providers: Vec<ProviderReport>,
    pub caveats: Vec<Caveat>,
}

/// Odds for one request; `previous` enables movement detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddsInput<'a> {
    pub current: Option<&'a OddsSnapshot>,
    pub previous: Option<&'a OddsSnapshot>,
}

impl<'a> OddsInput<'a> {
    pub fn current(odds: &'a OddsSnapshot) -> Self {
        Self {
            current: Some(odds),
            previous: None,
        }
    }
}

pub struct PredictionEngine {
    config: EngineConfig,
    providers: Vec<Arc<dyn ForecastProvider>>,
    value: ValueAnalyzer,
}

impl PredictionEngine {
    pub fn new(config: EngineConfig, providers: Vec<Arc<dyn ForecastProvider>>) -> Self {
        let value = ValueAnalyzer::new(&config);
        Self {
            config,
            providers,
            value,
        }
    }

    /// Statistical model plus every keyed chat endpoint. Offline swaps the
    /// chat endpoints for a seeded synthetic forecaster; without keys the
    /// statistical model runs alone.
    pub fn with_default_providers(config: EngineConfig, offline: bool) -> Self {
        let mut providers: Vec<Arc<dyn ForecastProvider>> =
            vec![Arc::new(StatisticalModel::new(&config))];
        if offline {
            providers.push(Arc::new(SyntheticProvider::new("synthetic", SYNTHETIC_SEED)));
        } else {
            for endpoint in config.chat_endpoints() {
                providers.push(Arc::new(ChatForecaster::new(endpoint.clone())));
            }
        }
        Self::new(config, providers)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    #[instrument(skip_all, fields(match_id = %ctx.match_id))]
    pub fn predict(
        &self,
        ctx: &MatchContext,
        odds: OddsInput<'_>,
        cancel: &CancelToken,
    ) -> Result<PredictionReport, PredictError> {
        let outcomes = gather_forecasts(&self.providers, ctx, self.config.provider_timeout, cancel);
        self.assemble(ctx, outcomes, odds)
    }

    /// Runs independent matches in parallel; each gets its own cancel token.
    pub fn predict_many(
        &self,
        jobs: &[(MatchContext, Option<OddsSnapshot>)],
    ) -> Vec<Result<PredictionReport, PredictError>> {
        jobs.par_iter()
            .map(|(ctx, odds)| {
                let input = OddsInput {
                    current: odds.as_ref(),
                    previous: None,
                };
                self.predict(ctx, input, &CancelToken::new())
            })
            .collect()
    }

    /// Validation onward, over provider answers already in hand.
    pub fn assemble(
        &self,
        ctx: &MatchContext,
        outcomes: Vec<ProviderOutcome>,
        odds: OddsInput<'_>,
    ) -> Result<PredictionReport, PredictError> {
        let requested = outcomes.len();
        let mut reports = Vec::with_capacity(requested);
        let mut answered: Vec<(String, ForecastCandidate, u64)> = Vec::new();
        for outcome in outcomes {
            let elapsed_ms = duration_ms(outcome.elapsed);
            match outcome.result {
                Ok(candidate) => answered.push((outcome.provider_id, candidate, elapsed_ms)),
                Err(err) => reports.push(failed_report(outcome.provider_id, &err, elapsed_ms)),
            }
        }
        let elapsed_of = |id: &str| {
            answered
                .iter()
                .find(|(pid, _, _)| pid == id)
                .map(|(_, _, ms)| *ms)
                .unwrap_or(0)
        };

        let (forecasts, rejected) =
            admit_forecasts(answered.iter().map(|(id, c, _)| (id.as_str(), c)));
        for f in &forecasts {
            reports.push(ProviderReport {
                provider_id: f.provider_id.clone(),
                state: ProviderState::Accepted,
                reason: None,
                elapsed_ms: elapsed_of(&f.provider_id),
            });
        }
        for (provider_id, err) in rejected {
            reports.push(ProviderReport {
                elapsed_ms: elapsed_of(&provider_id),
                provider_id,
                state: ProviderState::Rejected,
                reason: Some(err.to_string()),
            });
        }

        let ensemble = match ensemble::aggregate(&forecasts, &self.config.weights) {
            Ok(e) => e,
            Err(PredictError::NoForecasts) => {
                warn!(match_id = %ctx.match_id, requested, "no provider survived validation");
                return Err(PredictError::Unavailable {
                    requested,
                    failed: requested - forecasts.len(),
                });
            }
            Err(err) => return Err(err),
        };

        let markets = markets::generate(&ensemble, ctx);
        let (diagnostics, value) = rayon::join(
            || diagnostics::analyze(&markets),
            || {
                odds.current.map(|current| {
                    self.value.assess(
                        &ensemble.probabilities,
                        ensemble.confidence,
                        current,
                        odds.previous,
                    )
                })
            },
        );

        let mut caveats = ensemble.caveats.clone();
        if forecasts.len() < requested {
            caveats.push(Caveat::PartialProviderSet);
        }
        caveats.sort();
        caveats.dedup();

        info!(
            match_id = %ctx.match_id,
            outcome = %ensemble.outcome,
            confidence = ensemble.confidence,
            risk = ensemble.risk.as_str(),
            providers = forecasts.len(),
            "prediction assembled"
        );

        Ok(PredictionReport {
            match_id: ctx.match_id.clone(),
            home: ctx.home.name.clone(),
            away: ctx.away.name.clone(),
            generated_at: Utc::now(),
            ensemble,
            markets,
            diagnostics,
            value,
            providers: reports,
            caveats,
        })
    }
}

fn failed_report(provider_id: String, err: &ProviderError, elapsed_ms: u64) -> ProviderReport {
    ProviderReport {
        provider_id,
        state: ProviderState::Failed,
        reason: Some(err.to_string()),
        elapsed_ms,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Wraps ready-made candidates as if their providers had just answered.
pub fn answered(candidates: Vec<(String, ForecastCandidate)>) -> Vec<ProviderOutcome> {
    candidates
        .into_iter()
        .map(|(provider_id, candidate)| ProviderOutcome {
            provider_id,
            result: Ok(candidate),
            elapsed: Duration::ZERO,
        })
        .collect()
}
