use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{SettingsError, SettingsRepository, UserSettings};

/// Settings stored as JSON under `<namespace>:settings:user_id:<id>`.
pub struct RedisSettingsRepository {
    namespace: String,
    conn: ConnectionManager,
}

impl RedisSettingsRepository {
    pub async fn connect(url: &str, namespace: &str) -> Result<Self, SettingsError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            namespace: namespace.to_owned(),
            conn,
        })
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}:settings:user_id:{}", self.namespace, user_id)
    }
}

#[async_trait]
impl SettingsRepository for RedisSettingsRepository {
    async fn load(&self, user_id: &str) -> Result<Option<UserSettings>, SettingsError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.key(user_id)).await?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &str, settings: &UserSettings) -> Result<(), SettingsError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(settings)?;
        conn.set::<_, _, ()>(self.key(user_id), json).await?;
        Ok(())
    }
}
