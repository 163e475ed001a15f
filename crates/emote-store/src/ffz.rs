use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::http::{self, ProviderError};
use crate::provider::Provider;
use crate::types::{Emote, FfzEmote};

const GLOBAL_ENDPOINT: &str = "https://api.frankerfacez.com/v1/set/global";
const CHANNEL_ENDPOINT: &str = "https://api.frankerfacez.com/v1/room/id";
const SPECIFIC_ENDPOINT: &str = "https://api.frankerfacez.com/v1/emote";

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    default_sets: Vec<i64>,
    sets: HashMap<String, EmoteSet>,
}

#[derive(Debug, Deserialize)]
struct RoomResponse {
    room: RoomInfo,
    sets: HashMap<String, EmoteSet>,
}

#[derive(Debug, Deserialize)]
struct RoomInfo {
    set: i64,
}

#[derive(Debug, Deserialize)]
struct EmoteSet {
    emoticons: Vec<FfzEmote>,
}

#[derive(Debug, Deserialize)]
struct EmoteContainer {
    emote: FfzEmote,
}

pub struct FfzProvider {
    http: reqwest::Client,
}

impl FfzProvider {
    pub fn new() -> Self {
        Self {
            http: http::client(),
        }
    }
}

impl Default for FfzProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for FfzProvider {
    fn code(&self) -> char {
        'f'
    }

    async fn load_globals(&self) -> Result<Vec<Emote>, ProviderError> {
        let resp: GlobalResponse = http::get_json(&self.http, "ffz", GLOBAL_ENDPOINT).await?;
        // globals are the default sets, flattened in the order FFZ lists them
        let mut emotes = Vec::new();
        for set_id in &resp.default_sets {
            let set = resp.sets.get(&set_id.to_string()).ok_or_else(|| {
                ProviderError::Malformed(format!(
                    "ffz names default set {set_id} but did not provide it"
                ))
            })?;
            emotes.extend(set.emoticons.iter().cloned().map(Emote::Ffz));
        }
        tracing::debug!(count = emotes.len(), "Fetched FFZ global emotes");
        Ok(emotes)
    }

    async fn load_channel(&self, channel_id: &str) -> Result<Vec<Emote>, ProviderError> {
        let url = format!("{CHANNEL_ENDPOINT}/{channel_id}");
        let resp: RoomResponse = http::get_json(&self.http, "ffz", &url).await?;
        let set_id = resp.room.set;
        let set = resp.sets.get(&set_id.to_string()).ok_or_else(|| {
            ProviderError::Malformed(format!(
                "ffz names room set {set_id} for room {channel_id} but did not provide it"
            ))
        })?;
        Ok(set.emoticons.iter().cloned().map(Emote::Ffz).collect())
    }

    async fn load_specific(&self, emote_id: &str) -> Result<Emote, ProviderError> {
        let url = format!("{SPECIFIC_ENDPOINT}/{emote_id}");
        let container: EmoteContainer = http::get_json(&self.http, "ffz", &url).await?;
        Ok(Emote::Ffz(container.emote))
    }
}
