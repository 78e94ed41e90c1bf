use thiserror::Error;

/// Why a provider forecast (or a market parameter) was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("unknown outcome token `{0}`")]
    UnknownOutcome(String),

    #[error("score for {side} must be a non-negative integer, got {value}")]
    InvalidScore { side: &'static str, value: f64 },

    #[error("asian handicap line {0} is not one of -2, -1.5, -1, -0.5, 0, 0.5, 1, 1.5, 2")]
    InvalidHandicapLine(f64),

    #[error("half-time/full-time code `{0}` is not one of HH, HD, HA, DH, DD, DA, AH, AD, AA")]
    InvalidCombination(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider disabled: {0}")]
    Disabled(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable response: {0}")]
    Parse(String),

    #[error("no response within {0} ms")]
    TimedOut(u128),

    #[error("request cancelled by caller")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("no validated forecasts to aggregate")]
    NoForecasts,

    #[error("no prediction available: {failed} of {requested} providers failed or were rejected")]
    Unavailable { requested: usize, failed: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    #[error("prediction is for match {expected}, result is for match {actual}")]
    MatchMismatch { expected: String, actual: String },

    #[error("match {0} is not completed yet")]
    NotCompleted(String),

    #[error("match {0} is completed but has no final score")]
    MissingScore(String),

    #[error("prediction {0} has a negative stake")]
    NegativeStake(String),

    #[error("prediction {id} was settled at {settled} and cannot be re-settled at {offered}")]
    ConflictingResult {
        id: String,
        settled: String,
        offered: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SportError {
    #[error("sport `{0}` is not supported")]
    Unsupported(String),
}
