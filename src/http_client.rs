use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;

use crate::error::ProviderError;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const APP_USER_AGENT: &str = concat!("matchday_edge/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// POSTs a JSON body with a bearer key and returns the decoded JSON reply.
pub fn post_json(url: &str, api_key: &str, body: &Value) -> Result<Value, ProviderError> {
    let client = http_client().map_err(|err| ProviderError::Http(format!("{err:#}")))?;
    let resp = client
        .post(url)
        .header(USER_AGENT, APP_USER_AGENT)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {api_key}"))
        .json(body)
        .send()
        .map_err(|err| ProviderError::Http(err.to_string()))?;

    let status = resp.status();
    let text = resp
        .text()
        .map_err(|err| ProviderError::Http(format!("failed reading body: {err}")))?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: truncate(&text, 300),
        });
    }
    serde_json::from_str(&text).map_err(|err| ProviderError::Parse(err.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
