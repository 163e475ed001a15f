use std::sync::Arc;

use anyhow::{anyhow, Context};
use irc_codec::Message;

use super::{commands, twitch_api, SessionCtx};
use crate::storage::UserSettings;

/// What to do with a handled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forward the original bytes untouched.
    Forward,
    /// Forward the re-serialized, modified message.
    ForwardModified,
    /// Consume the line; nothing reaches the other side.
    Suppress,
}

impl SessionCtx {
    /// Lines travelling Twitch -> client.
    pub(crate) async fn handle_twitch(&self, msg: &mut Message) -> anyhow::Result<Disposition> {
        match msg.command.as_str() {
            "PRIVMSG" | "USERNOTICE" => {
                let channel_id = msg
                    .tag("room-id")
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("missing room-id tag on {}", msg.command))?;
                self.inject_emotes(msg, &channel_id)
                    .await
                    .context("inject emotes")?;
                Ok(Disposition::ForwardModified)
            }
            "ROOMSTATE" => {
                let channel_id = msg
                    .tag("room-id")
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("missing room-id tag on ROOMSTATE"))?;
                if let Some(channel_name) = msg.params.first() {
                    self.store
                        .record_channel_name(channel_name, &channel_id)
                        .await;
                }
                self.store
                    .load_if_not_loaded(&channel_id)
                    .await
                    .context("load channel emotes")?;
                Ok(Disposition::Forward)
            }
            _ => Ok(Disposition::Forward),
        }
    }

    /// Lines travelling client -> Twitch.
    pub(crate) async fn handle_client(&self, msg: &mut Message) -> anyhow::Result<Disposition> {
        match msg.command.as_str() {
            "PASS" => {
                if let Some(token) = msg.params.first() {
                    // identify the user off the forwarding path
                    self.spawn_user_bootstrap(token.clone());
                }
                Ok(Disposition::Forward)
            }
            "NICK" => {
                let mut state = self.shared.state.lock().await;
                if !state.greeted {
                    state.username = msg.params.first().cloned().unwrap_or_default();
                    state.greeted = true;
                }
                Ok(Disposition::Forward)
            }
            "PRIVMSG" => {
                let command_input = msg
                    .trailing()
                    .and_then(|body| body.strip_prefix(commands::COMMAND_PREFIX))
                    .map(str::to_owned);
                if let Some(input) = command_input {
                    let channel = msg.params.first().cloned().unwrap_or_default();
                    commands::dispatch(self, &channel, &input).await;
                    return Ok(Disposition::Suppress);
                }
                Ok(Disposition::Forward)
            }
            _ => Ok(Disposition::Forward),
        }
    }

    /// Resolve the OAuth token to a user id and pull that user's settings,
    /// creating defaults on first use. Failures are logged, never surfaced:
    /// the PASS line has already been forwarded.
    fn spawn_user_bootstrap(&self, token: String) {
        let shared = Arc::clone(&self.shared);
        let repo = self.repo.clone();
        let default_gifs = self.default_include_gifs;
        tokio::spawn(async move {
            let user_id = match twitch_api::user_id_from_oauth(&token).await {
                Ok(user_id) => user_id,
                Err(e) => {
                    tracing::warn!(error = %e, "OAuth token validation failed");
                    return;
                }
            };
            tracing::debug!(user_id = %user_id, "Validated client token");
            shared.state.lock().await.user_id = Some(user_id.clone());

            let Some(repo) = repo else { return };
            let settings = match repo.load(&user_id).await {
                Ok(Some(settings)) => settings,
                Ok(None) => {
                    let settings = UserSettings {
                        cache_destroyer_key: String::new(),
                        enable_gif_emotes: default_gifs,
                    };
                    if let Err(e) = repo.save(&user_id, &settings).await {
                        tracing::warn!(error = %e, user_id = %user_id, "Saving default settings failed");
                    }
                    settings
                }
                Err(e) => {
                    tracing::warn!(error = %e, user_id = %user_id, "Loading settings failed");
                    return;
                }
            };
            shared.state.lock().await.settings = Some(settings);
        });
    }

    /// Persist settings without blocking the caller.
    pub(crate) fn save_settings_background(
        &self,
        user_id: Option<String>,
        settings: UserSettings,
    ) {
        let Some(repo) = self.repo.clone() else { return };
        let Some(user_id) = user_id else {
            tracing::warn!("Cannot save settings before the user id is known");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = repo.save(&user_id, &settings).await {
                tracing::warn!(error = %e, user_id = %user_id, "Saving settings failed");
            }
        });
    }
}
