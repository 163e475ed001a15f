use async_trait::async_trait;

use crate::http::{self, ProviderError};
use crate::provider::Provider;
use crate::types::{Emote, SevenTvEmote};

const GLOBAL_ENDPOINT: &str = "https://api.7tv.app/v2/emotes/global";
const CHANNEL_ENDPOINT_PREFIX: &str = "https://api.7tv.app/v2/users";
const SPECIFIC_ENDPOINT: &str = "https://api.7tv.app/v2/emotes";

pub struct SevenTvProvider {
    http: reqwest::Client,
}

impl SevenTvProvider {
    pub fn new() -> Self {
        Self {
            http: http::client(),
        }
    }
}

impl Default for SevenTvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for SevenTvProvider {
    fn code(&self) -> char {
        's'
    }

    async fn load_globals(&self) -> Result<Vec<Emote>, ProviderError> {
        let emotes: Vec<SevenTvEmote> = http::get_json(&self.http, "7tv", GLOBAL_ENDPOINT).await?;
        tracing::debug!(count = emotes.len(), "Fetched 7TV global emotes");
        Ok(emotes.into_iter().map(Emote::SevenTv).collect())
    }

    async fn load_channel(&self, channel_id: &str) -> Result<Vec<Emote>, ProviderError> {
        let url = format!("{CHANNEL_ENDPOINT_PREFIX}/{channel_id}/emotes");
        match http::get_json::<Vec<SevenTvEmote>>(&self.http, "7tv", &url).await {
            Ok(emotes) => Ok(emotes.into_iter().map(Emote::SevenTv).collect()),
            // 7TV answers 404 for channels without an emote set
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn load_specific(&self, emote_id: &str) -> Result<Emote, ProviderError> {
        let url = format!("{SPECIFIC_ENDPOINT}/{emote_id}");
        let emote: SevenTvEmote = http::get_json(&self.http, "7tv", &url).await?;
        Ok(Emote::SevenTv(emote))
    }
}
