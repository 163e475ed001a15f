use std::sync::Arc;

use anyhow::Context;
use emote_store::{Emote, ImageSize};
use irc_codec::{EmoteTag, Message};
use rand::Rng;

use super::{SessionCtx, CACHE_DESTROYER_LEN};

/// Source images at least this wide-per-tall are rendered as two halves.
const WIDE_RATIO_THRESHOLD: f64 = 1.75;
/// A split range needs at least this many runes to place both halves.
const MIN_WIDE_RUNES: usize = 3;

impl SessionCtx {
    /// Rewrite a PRIVMSG/USERNOTICE `emotes` tag so third-party emotes in the
    /// body render like native Twitch emotes.
    pub(crate) async fn inject_emotes(
        &self,
        msg: &mut Message,
        channel_id: &str,
    ) -> anyhow::Result<()> {
        let mut tag = EmoteTag::parse(msg.tag("emotes").unwrap_or_default())?;
        let Some(body) = msg.trailing().map(str::to_owned) else {
            return Ok(());
        };

        let (include_gifs, destroyer) = self.emote_settings().await;

        // ACTION bodies hide the text behind a 0x01 envelope; search what
        // follows the command word. Indices restart over the truncated body,
        // which is what clients are observed to render against.
        let searched = if body.starts_with('\u{1}') {
            match body.find(' ') {
                Some(space) => body[space + 1..].to_owned(),
                None => String::new(),
            }
        } else {
            body
        };

        let mut index = 0usize;
        for word in searched.split(' ') {
            // rune count, so multi-byte emoji keep the ranges honest
            let rune_len = word.chars().count();
            if let Some(emote) = self.store.emote_for_word(word, channel_id).await {
                if include_gifs || !emote.is_gif() {
                    self.add_emote(&mut tag, &emote, &destroyer, index, rune_len)
                        .await?;
                }
            }
            index += rune_len + 1;
        }

        msg.set_tag("emotes", &tag.to_string());
        Ok(())
    }

    async fn add_emote(
        &self,
        tag: &mut EmoteTag,
        emote: &Arc<Emote>,
        destroyer: &str,
        index: usize,
        rune_len: usize,
    ) -> anyhow::Result<()> {
        let prefix = if destroyer.is_empty() {
            String::new()
        } else {
            format!("d{destroyer}")
        };
        let code = emote.provider_code();
        let id = emote.id();

        let Some(cache) = &self.cache else {
            tag.add(&format!("{prefix}{code}{id}"), (index, index + rune_len - 1));
            return Ok(());
        };

        let ratio = cache
            .aspect_ratio(emote)
            .await
            .context("probe emote aspect ratio")?;
        if ratio >= WIDE_RATIO_THRESHOLD && rune_len >= MIN_WIDE_RUNES {
            // wide source: two square halves over a split range
            tag.add(&format!("{prefix}vl{code}{id}"), (index, index + 1));
            tag.add(
                &format!("{prefix}vr{code}{id}"),
                (index + 2, index + rune_len - 1),
            );
            self.spawn_prefetch(Arc::clone(emote), true);
        } else {
            tag.add(&format!("{prefix}{code}{id}"), (index, index + rune_len - 1));
            self.spawn_prefetch(Arc::clone(emote), false);
        }
        Ok(())
    }

    /// Warm the cache for every size the client might fetch. Best effort.
    fn spawn_prefetch(&self, emote: Arc<Emote>, halves: bool) {
        let Some(cache) = self.cache.clone() else { return };
        tokio::spawn(async move {
            for size in ImageSize::ALL {
                let result = if halves {
                    cache.prefetch_halves(&emote, size).await
                } else {
                    cache.prefetch(&emote, size).await
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, id = %emote.id(), "Prefetching emote failed");
                }
            }
        });
    }

    /// Snapshot the gif gate and destroyer key. A non-empty key of the wrong
    /// length is replaced before it reaches a URL.
    async fn emote_settings(&self) -> (bool, String) {
        let mut state = self.shared.state.lock().await;
        let user_id = state.user_id.clone();
        match &mut state.settings {
            None => (self.default_include_gifs, String::new()),
            Some(settings) => {
                if !settings.cache_destroyer_key.is_empty()
                    && settings.cache_destroyer_key.chars().count() != CACHE_DESTROYER_LEN
                {
                    settings.cache_destroyer_key = new_destroyer_key();
                    self.save_settings_background(user_id, settings.clone());
                }
                (
                    settings.enable_gif_emotes,
                    settings.cache_destroyer_key.clone(),
                )
            }
        }
    }
}

/// A fresh cache-destroyer token: lowercase alphanumeric runes.
pub(crate) fn new_destroyer_key() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..CACHE_DESTROYER_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
