use async_trait::async_trait;
use serde::Deserialize;

use crate::http::{self, ProviderError};
use crate::provider::Provider;
use crate::types::{BttvEmote, Emote};

const GLOBAL_ENDPOINT: &str = "https://api.betterttv.net/3/cached/emotes/global";
const CHANNEL_ENDPOINT: &str = "https://api.betterttv.net/3/cached/users/twitch";
const SPECIFIC_ENDPOINT: &str = "https://api.betterttv.net/3/emotes";

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[serde(rename = "channelEmotes")]
    channel_emotes: Vec<BttvEmote>,
    #[serde(rename = "sharedEmotes")]
    shared_emotes: Vec<BttvEmote>,
}

pub struct BttvProvider {
    http: reqwest::Client,
}

impl BttvProvider {
    pub fn new() -> Self {
        Self {
            http: http::client(),
        }
    }
}

impl Default for BttvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for BttvProvider {
    fn code(&self) -> char {
        'b'
    }

    async fn load_globals(&self) -> Result<Vec<Emote>, ProviderError> {
        let emotes: Vec<BttvEmote> = http::get_json(&self.http, "bttv", GLOBAL_ENDPOINT).await?;
        tracing::debug!(count = emotes.len(), "Fetched BTTV global emotes");
        Ok(emotes.into_iter().map(Emote::Bttv).collect())
    }

    async fn load_channel(&self, channel_id: &str) -> Result<Vec<Emote>, ProviderError> {
        let url = format!("{CHANNEL_ENDPOINT}/{channel_id}");
        let resp: ChannelResponse = http::get_json(&self.http, "bttv", &url).await?;
        Ok(resp
            .channel_emotes
            .into_iter()
            .chain(resp.shared_emotes)
            .map(Emote::Bttv)
            .collect())
    }

    async fn load_specific(&self, emote_id: &str) -> Result<Emote, ProviderError> {
        let url = format!("{SPECIFIC_ENDPOINT}/{emote_id}");
        let emote: BttvEmote = http::get_json(&self.http, "bttv", &url).await?;
        Ok(Emote::Bttv(emote))
    }
}
