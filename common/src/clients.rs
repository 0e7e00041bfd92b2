use anyhow::Context;
use core::time::Duration;
use once_cell::sync::Lazy;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::env;

const DEFAULT_FACEIT_API_ROOT: &str = "https://open.faceit.com/data/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub static FACEIT_API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("FACEIT_API_ROOT")
        .ok()
        .filter(|root| !root.trim().is_empty())
        .map(|root| root.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_FACEIT_API_ROOT.to_string())
});

/// Builds the FACEIT Data API client from the `FACEIT_API_KEY` environment variable.
///
/// A missing key is an error: every request against the data API needs the
/// bearer token, so callers should treat this as fatal at startup.
pub fn get_faceit_client() -> anyhow::Result<reqwest::Client> {
    let api_key = env::var("FACEIT_API_KEY").context("FACEIT_API_KEY must be set")?;
    build_faceit_client(&api_key)
}

pub fn build_faceit_client(api_key: &str) -> anyhow::Result<reqwest::Client> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        anyhow::bail!("FACEIT api key is empty");
    }
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .context("FACEIT api key is not a valid header value")?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build FACEIT http client")
}
