use std::time::Duration;

use reqwest::header;
use serde::Deserialize;

const VALIDATE_ENDPOINT: &str = "https://id.twitch.tv/oauth2/validate";
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    user_id: String,
}

/// Resolve a client OAuth token to its Twitch user id.
pub(crate) async fn user_id_from_oauth(token: &str) -> Result<String, reqwest::Error> {
    let token = token.strip_prefix("oauth:").unwrap_or(token);
    let client = reqwest::Client::builder()
        .timeout(VALIDATE_TIMEOUT)
        .build()?;
    let resp = client
        .get(VALIDATE_ENDPOINT)
        .header(header::AUTHORIZATION, format!("OAuth {token}"))
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.json::<ValidateResponse>().await?.user_id)
}
