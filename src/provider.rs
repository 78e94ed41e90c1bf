use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::forecast::ForecastCandidate;
use crate::match_context::MatchContext;

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// An independent source of match forecasts.
pub trait ForecastProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Long-running providers should check `cancel` before expensive work.
    fn forecast(
        &self,
        ctx: &MatchContext,
        cancel: &CancelToken,
    ) -> Result<ForecastCandidate, ProviderError>;
}

/// Shared flag a caller flips to abandon a prediction request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ProviderError> {
        if self.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    pub provider_id: String,
    pub result: Result<ForecastCandidate, ProviderError>,
    pub elapsed: Duration,
}

/// Asks every provider at once and waits until all answer, the deadline passes
/// or the caller cancels.
///
/// Results come back in provider order. Providers that never answered are
/// reported as timed out (or cancelled); their threads are left to finish on
/// their own and their late answers are dropped.
pub fn gather_forecasts(
    providers: &[Arc<dyn ForecastProvider>],
    ctx: &MatchContext,
    timeout: Duration,
    cancel: &CancelToken,
) -> Vec<ProviderOutcome> {
    let started = Instant::now();
    let deadline = started + timeout;
    let (tx, rx) = mpsc::channel();

    for (idx, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            let result = match cancel.check() {
                Ok(()) => provider.forecast(&ctx, &cancel),
                Err(err) => Err(err),
            };
            let _ = tx.send((idx, result, t0.elapsed()));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<(Result<ForecastCandidate, ProviderError>, Duration)>> =
        vec![None; providers.len()];
    let mut pending = providers.len();
    while pending > 0 && !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wait = (deadline - now).min(CANCEL_POLL);
        match rx.recv_timeout(wait) {
            Ok((idx, result, elapsed)) => {
                if slots[idx].is_none() {
                    pending -= 1;
                }
                slots[idx] = Some((result, elapsed));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let cancelled = cancel.is_cancelled();
    providers
        .iter()
        .zip(slots)
        .map(|(provider, slot)| {
            let (result, elapsed) = slot.unwrap_or_else(|| {
                let err = if cancelled {
                    ProviderError::Cancelled
                } else {
                    ProviderError::TimedOut(timeout.as_millis())
                };
                (Err(err), started.elapsed())
            });
            match &result {
                Ok(_) => debug!(provider = provider.id(), ?elapsed, "forecast received"),
                Err(err) => warn!(provider = provider.id(), reason = %err, "provider failed"),
            }
            ProviderOutcome {
                provider_id: provider.id().to_string(),
                result,
                elapsed,
            }
        })
        .collect()
}
