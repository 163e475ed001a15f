use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

pub(crate) const USER_AGENT: &str = "mobile-emotes-proxy/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("emote api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned HTTP {status} for {url}")]
    Status {
        provider: &'static str,
        status: u16,
        url: String,
    },
    #[error("{0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Status { status: 404, .. })
    }
}

pub(crate) fn client() -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .unwrap_or_default()
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    provider: &'static str,
    url: &str,
) -> Result<T, ProviderError> {
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }
    Ok(resp.json().await?)
}
