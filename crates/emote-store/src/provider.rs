use async_trait::async_trait;

use crate::http::ProviderError;
use crate::types::Emote;
use crate::{BttvProvider, FfzProvider, SevenTvProvider};

/// One third-party emote source.
///
/// Implementations translate the provider's own JSON into the uniform
/// [`Emote`] record.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Single-letter code identifying this provider in ids and cache keys.
    fn code(&self) -> char;

    async fn load_globals(&self) -> Result<Vec<Emote>, ProviderError>;

    async fn load_channel(&self, channel_id: &str) -> Result<Vec<Emote>, ProviderError>;

    /// Look up one emote by id, for emotes referenced outside any catalog.
    async fn load_specific(&self, emote_id: &str) -> Result<Emote, ProviderError>;
}

/// The supported providers, in word-map priority order: later entries win
/// name conflicts.
pub fn default_providers() -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(BttvProvider::new()),
        Box::new(FfzProvider::new()),
        Box::new(SevenTvProvider::new()),
    ]
}
