use indexmap::IndexMap;
use irc_codec::{Message, Prefix};

use super::{modifier, socket::Frame, SessionCtx};

pub(crate) const COMMAND_PREFIX: &str = "@@";

const SETTINGS_DISABLED: &str = "Error: User settings are not enabled";

const HELP_TEXT: [&str; 6] = [
    "Twitch Mobile Emotes Help",
    "@@reload - Reload BTTV and FFZ emotes",
    "@@cache - Set a cache destroyer value (warning: unstable)",
    "@@cache off - Disable cache destroyer",
    "@@gifs [on|off] - Enable or disable GIF emotes",
    "@@help - Show this message",
];

/// Run one in-band command. The triggering PRIVMSG is never forwarded.
pub(crate) async fn dispatch(ctx: &SessionCtx, channel: &str, input: &str) {
    let mut parts = input.split(' ');
    let Some(name) = parts.next().filter(|name| !name.is_empty()) else {
        return;
    };
    let args: Vec<&str> = parts.collect();
    match name {
        "reload" => reload(ctx, channel).await,
        "cache" => cache_destroyer(ctx, channel, &args).await,
        "gifs" => gifs(ctx, channel, &args).await,
        "help" => help(ctx, channel).await,
        other => tracing::debug!(command = other, "Unknown in-band command"),
    }
}

async fn reload(ctx: &SessionCtx, channel: &str) {
    let Some(channel_id) = ctx.store.channel_id_for(channel).await else {
        tracing::warn!(channel, "Reload requested before ROOMSTATE named the channel");
        return;
    };
    if let Err(e) = ctx.store.load(&channel_id).await {
        tracing::warn!(error = %e, channel_id = %channel_id, "Reloading channel emotes failed");
        return;
    }
    let body = match mention(ctx).await {
        Some(user) => format!(
            "@{user}, reloaded BTTV and FFZ emotes. The old emote images may remain cached on your device."
        ),
        None => "Reloaded BTTV and FFZ emotes. The old emote images may remain cached on your device."
            .to_owned(),
    };
    reply(ctx, channel, &body).await;
}

async fn cache_destroyer(ctx: &SessionCtx, channel: &str, args: &[&str]) {
    let body;
    {
        let mut state = ctx.shared.state.lock().await;
        let greeted = state.greeted;
        let username = state.username.clone();
        let user_id = state.user_id.clone();
        let Some(settings) = state.settings.as_mut() else {
            drop(state);
            reply(ctx, channel, SETTINGS_DISABLED).await;
            return;
        };
        if let ["off"] = args {
            settings.cache_destroyer_key.clear();
            body = "Removed cache destroyer value".to_owned();
        } else {
            settings.cache_destroyer_key = modifier::new_destroyer_key();
            body = if greeted {
                format!(
                    "@{username}, set new cache destroyer value to {}",
                    settings.cache_destroyer_key
                )
            } else {
                format!(
                    "Set new cache destroyer value to {}",
                    settings.cache_destroyer_key
                )
            };
        }
        let snapshot = settings.clone();
        drop(state);
        ctx.save_settings_background(user_id, snapshot);
    }
    reply(ctx, channel, &body).await;
}

async fn gifs(ctx: &SessionCtx, channel: &str, args: &[&str]) {
    let enable = match args {
        ["on"] => true,
        ["off"] => false,
        _ => {
            reply(ctx, channel, "Usage: gifs [on|off]").await;
            return;
        }
    };
    {
        let mut state = ctx.shared.state.lock().await;
        let user_id = state.user_id.clone();
        let Some(settings) = state.settings.as_mut() else {
            drop(state);
            reply(ctx, channel, SETTINGS_DISABLED).await;
            return;
        };
        settings.enable_gif_emotes = enable;
        let snapshot = settings.clone();
        drop(state);
        ctx.save_settings_background(user_id, snapshot);
    }
    let body = if enable {
        "Enabled gif emotes"
    } else {
        "Disabled gif emotes"
    };
    reply(ctx, channel, body).await;
}

async fn help(ctx: &SessionCtx, channel: &str) {
    for line in HELP_TEXT {
        reply(ctx, channel, line).await;
    }
}

async fn mention(ctx: &SessionCtx) -> Option<String> {
    let state = ctx.shared.state.lock().await;
    state.greeted.then(|| state.username.clone())
}

/// Write a synthesized PRIVMSG from the virtual system user back to the
/// client.
async fn reply(ctx: &SessionCtx, channel: &str, body: &str) {
    let msg = virtual_message(channel, body);
    let mut writer = ctx.client_writer.lock().await;
    if let Err(e) = writer.send_frame(Frame::Text(format!("{msg}\r\n"))).await {
        tracing::warn!(error = %e, "Writing command reply failed");
    }
}

/// A chat line from the fake `mobile_emotes` user, dressed up with every
/// badge so it stands out in the client.
fn virtual_message(channel: &str, body: &str) -> Message {
    let mut tags = IndexMap::new();
    tags.insert("id".to_owned(), uuid::Uuid::new_v4().to_string());
    tags.insert("user-id".to_owned(), "1".to_owned());
    tags.insert("display-name".to_owned(), "Mobile Emotes".to_owned());
    tags.insert("color".to_owned(), "#FF0000".to_owned());
    tags.insert(
        "badges".to_owned(),
        "staff/1,broadcaster/1,moderator/1".to_owned(),
    );
    tags.insert(
        "tmi-sent-ts".to_owned(),
        chrono::Utc::now().timestamp_millis().to_string(),
    );
    Message {
        tags,
        prefix: Some(Prefix {
            name: "mobile_emotes".to_owned(),
            user: Some("mobile_emotes".to_owned()),
            host: Some("mobile_emotes.tmi.twitch.tv".to_owned()),
        }),
        command: "PRIVMSG".to_owned(),
        params: vec![channel.to_owned(), body.to_owned()],
        has_trailing: true,
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn test_virtual_message_shape() {
        let msg = virtual_message("#dallas", "Disabled gif emotes");
        let line = msg.to_string();
        assert!(line.contains("display-name=Mobile\\sEmotes"));
        assert!(line.contains("color=#FF0000"));
        assert!(line.contains("badges=staff/1,broadcaster/1,moderator/1"));
        assert!(line.contains("user-id=1"));
        assert!(line.ends_with("PRIVMSG #dallas :Disabled gif emotes"));
        assert!(line.contains(":mobile_emotes!mobile_emotes@mobile_emotes.tmi.twitch.tv"));

        // the id tag is a fresh uuid each time
        let other = virtual_message("#dallas", "Disabled gif emotes");
        assert_ne!(msg.tag("id"), other.tag("id"));
    }
}
