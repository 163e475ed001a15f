//! Per-user settings persistence.

mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::redis::RedisSettingsRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub cache_destroyer_key: String,
    pub enable_gif_emotes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("settings serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Abstract settings store. `Ok(None)` from `load` means the user has no
/// saved settings yet, which is not an error.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserSettings>, SettingsError>;
    async fn save(&self, user_id: &str, settings: &UserSettings) -> Result<(), SettingsError>;
}
