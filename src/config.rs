use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const CACHE_DIR: &str = "matchday_edge";
const LEDGER_FILE: &str = "ledger.sqlite";

const DEFAULT_WEIGHTS: &str = "statistical:0.5,gpt4:0.3,deepseek:0.2";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_KELLY: f64 = 0.10;
const DEFAULT_MOVEMENT_THRESHOLD: f64 = 0.15;
const DEFAULT_POINTS_PER_CORRECT: u32 = 10;

/// Weight given to a provider that has no configured prior.
pub const FALLBACK_PROVIDER_WEIGHT: f64 = 0.5;

/// Base per-provider priors for the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderWeights {
    weights: BTreeMap<String, f64>,
}

impl ProviderWeights {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = pairs
            .into_iter()
            .filter(|(_, w)| w.is_finite() && *w >= 0.0)
            .map(|(id, w)| (id.into(), w))
            .collect();
        Self { weights }
    }

    /// Parses `id:weight,id:weight`. Malformed entries are skipped.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').filter_map(|entry| {
            let (id, w) = entry.split_once(':')?;
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            Some((id.to_string(), w.trim().parse::<f64>().ok()?))
        }))
    }

    pub fn base(&self, provider_id: &str) -> f64 {
        self.weights
            .get(provider_id)
            .copied()
            .unwrap_or(FALLBACK_PROVIDER_WEIGHT)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl Default for ProviderWeights {
    fn default() -> Self {
        Self::parse(DEFAULT_WEIGHTS)
    }
}

/// Unordered pairs of clubs whose meetings count as derbies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rivalries {
    pairs: HashSet<(String, String)>,
}

impl Rivalries {
    /// Parses `Team A:Team B,Team C:Team D`.
    pub fn parse(raw: &str) -> Self {
        let mut out = Self::default();
        for entry in raw.split(',') {
            if let Some((a, b)) = entry.split_once(':') {
                out.insert(a, b);
            }
        }
        out
    }

    pub fn insert(&mut self, a: &str, b: &str) {
        let (a, b) = (normalize_team(a), normalize_team(b));
        if a.is_empty() || b.is_empty() || a == b {
            return;
        }
        self.pairs.insert(ordered(a, b));
    }

    pub fn is_derby(&self, home: &str, away: &str) -> bool {
        self.pairs
            .contains(&ordered(normalize_team(home), normalize_team(away)))
    }
}

fn normalize_team(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn ordered(a: String, b: String) -> (String, String) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEndpoint {
    pub provider_id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub json_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub weights: ProviderWeights,
    pub provider_timeout: Duration,
    pub max_kelly_fraction: f64,
    pub odds_movement_threshold: f64,
    pub ai_enabled: bool,
    pub openai: ChatEndpoint,
    pub deepseek: ChatEndpoint,
    pub stat_logit_scale: f64,
    pub stat_draw_bias: f64,
    pub rivalries: Rivalries,
    pub ledger_path: Option<PathBuf>,
    pub points_per_correct: u32,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |key: &str, default: f64| {
            get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
        };

        let weights = get("ENSEMBLE_WEIGHTS")
            .map(|raw| ProviderWeights::parse(&raw))
            .filter(|w| !w.is_empty())
            .unwrap_or_default();
        let provider_timeout_secs = get("PROVIDER_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS)
            .clamp(1, 120);

        let openai = ChatEndpoint {
            provider_id: "gpt4".to_string(),
            base_url: get("OPENAI_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: get("OPENAI_API_KEY"),
            model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4-turbo-preview".to_string()),
            temperature: num("OPENAI_TEMPERATURE", 0.3).clamp(0.0, 2.0),
            max_tokens: num("OPENAI_MAX_TOKENS", 1000.0).clamp(64.0, 8192.0) as u32,
            system_prompt: "You are a soccer prediction expert.".to_string(),
            json_mode: false,
        };
        let deepseek = ChatEndpoint {
            provider_id: "deepseek".to_string(),
            base_url: get("DEEPSEEK_API_URL")
                .unwrap_or_else(|| "https://api.deepseek.com/v1".to_string()),
            api_key: get("DEEPSEEK_API_KEY"),
            model: get("DEEPSEEK_MODEL").unwrap_or_else(|| "deepseek-chat".to_string()),
            temperature: num("DEEPSEEK_TEMPERATURE", 0.3).clamp(0.0, 2.0),
            max_tokens: num("DEEPSEEK_MAX_TOKENS", 1000.0).clamp(64.0, 8192.0) as u32,
            system_prompt: "You are an expert soccer analyst specializing in match predictions."
                .to_string(),
            json_mode: true,
        };

        Self {
            weights,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            max_kelly_fraction: num("MAX_KELLY_FRACTION", DEFAULT_MAX_KELLY)
                .clamp(0.0, DEFAULT_MAX_KELLY),
            odds_movement_threshold: num("ODDS_MOVEMENT_THRESHOLD", DEFAULT_MOVEMENT_THRESHOLD)
                .clamp(0.01, 1.0),
            ai_enabled: lookup_bool(&get, "AI_PREDICTION_ENABLED", true),
            openai,
            deepseek,
            stat_logit_scale: num("STAT_LOGIT_SCALE", 1.0).clamp(0.5, 1.8),
            stat_draw_bias: num("STAT_DRAW_BIAS", 0.0).clamp(-1.0, 1.0),
            rivalries: get("RIVALRIES")
                .map(|raw| Rivalries::parse(&raw))
                .unwrap_or_default(),
            ledger_path: get("LEDGER_DB").map(PathBuf::from).or_else(default_ledger_path),
            points_per_correct: get("POINTS_PER_CORRECT")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(DEFAULT_POINTS_PER_CORRECT),
        }
    }

    /// Chat endpoints that have a key and are switched on.
    pub fn chat_endpoints(&self) -> Vec<&ChatEndpoint> {
        if !self.ai_enabled {
            return Vec::new();
        }
        [&self.openai, &self.deepseek]
            .into_iter()
            .filter(|e| e.api_key.is_some())
            .collect()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn lookup_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    get(key)
        .map(|v| {
            let t = v.to_ascii_lowercase();
            !(t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn default_ledger_path() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(LEDGER_FILE));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join(CACHE_DIR)
            .join(LEDGER_FILE),
    )
}
