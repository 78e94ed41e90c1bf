use serde_json::{Value, json};
use tracing::debug;

use crate::config::ChatEndpoint;
use crate::error::ProviderError;
use crate::forecast::ForecastCandidate;
use crate::http_client::post_json;
use crate::match_context::MatchContext;
use crate::provider::{CancelToken, ForecastProvider};

/// Forecaster backed by an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatForecaster {
    endpoint: ChatEndpoint,
}

impl ChatForecaster {
    pub fn new(endpoint: ChatEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn request_body(&self, ctx: &MatchContext) -> Value {
        let mut body = json!({
            "model": self.endpoint.model,
            "messages": [
                {"role": "system", "content": self.endpoint.system_prompt},
                {"role": "user", "content": render_prompt(ctx)},
            ],
            "temperature": self.endpoint.temperature,
            "max_tokens": self.endpoint.max_tokens,
        });
        if self.endpoint.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

impl ForecastProvider for ChatForecaster {
    fn id(&self) -> &str {
        &self.endpoint.provider_id
    }

    fn forecast(
        &self,
        ctx: &MatchContext,
        cancel: &CancelToken,
    ) -> Result<ForecastCandidate, ProviderError> {
        let key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Disabled(format!("{} has no api key", self.id())))?;
        cancel.check()?;

        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let reply = post_json(&url, key, &self.request_body(ctx))?;
        cancel.check()?;
        debug!(provider = self.id(), "chat completion received");
        parse_completion(&reply)
    }
}

/// Pulls the first choice's message content and decodes it as a forecast.
pub fn parse_completion(reply: &Value) -> Result<ForecastCandidate, ProviderError> {
    let content = reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Parse("no message content in completion".to_string()))?;
    parse_forecast_json(content)
}

/// Models sometimes wrap the JSON in a markdown fence or chatter around it.
pub fn parse_forecast_json(content: &str) -> Result<ForecastCandidate, ProviderError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => return Err(ProviderError::Parse("no JSON object in reply".to_string())),
    };
    serde_json::from_str(slice).map_err(|err| ProviderError::Parse(err.to_string()))
}

pub fn render_prompt(ctx: &MatchContext) -> String {
    let h2h = ctx.head_to_head;
    let weather = ctx
        .weather
        .map(|w| {
            format!(
                "{:.0}C, {:.1}mm/h rain, {:.0}m/s wind",
                w.temperature, w.precipitation, w.wind_speed
            )
        })
        .unwrap_or_else(|| "unknown".to_string());
    let competition = if ctx.competition.is_empty() {
        "unspecified"
    } else {
        ctx.competition.as_str()
    };

    format!(
        "Analyze the following soccer match and provide a detailed prediction.\n\n\
         Match: {home} vs {away}\n\
         Competition: {competition}\n\
         Derby: {derby}\n\
         Importance: {importance:?}\n\
         Weather: {weather}\n\n\
         {home} (home): rating {hr:.0}, form {hf}, scored {hs:.2}/game, conceded {hc:.2}/game, {hrest} days rest\n\
         {away} (away): rating {ar:.0}, form {af}, scored {as_:.2}/game, conceded {ac:.2}/game, {arest} days rest\n\
         Head to head: {hw} home wins, {d} draws, {aw} away wins\n\n\
         Respond with a single JSON object with keys:\n\
         \"predicted_outcome\" (one of \"home_win\", \"draw\", \"away_win\"),\n\
         \"score_prediction\" ({{\"home\": int, \"away\": int}}),\n\
         \"confidence\" (number between 0 and 1),\n\
         \"reasoning\" (list of short strings),\n\
         \"key_factors\" (list of short strings).",
        home = ctx.home.name,
        away = ctx.away.name,
        derby = if ctx.is_derby { "yes" } else { "no" },
        importance = ctx.importance,
        hr = ctx.home.rating,
        hf = display_form(&ctx.home.form),
        hs = ctx.home.goals_scored_avg,
        hc = ctx.home.goals_conceded_avg,
        hrest = ctx.home.rest_days,
        ar = ctx.away.rating,
        af = display_form(&ctx.away.form),
        as_ = ctx.away.goals_scored_avg,
        ac = ctx.away.goals_conceded_avg,
        arest = ctx.away.rest_days,
        hw = h2h.home_wins,
        d = h2h.draws,
        aw = h2h.away_wins,
    )
}

fn display_form(form: &str) -> &str {
    if form.is_empty() { "n/a" } else { form }
}
