use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::http::ProviderError;
use crate::provider::{default_providers, Provider};
use crate::types::Emote;

/// Channel catalogs go stale after this long and are reloaded on next use.
const CHANNEL_CATALOG_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("load emotes from provider {code:?}: {source}")]
    Provider {
        code: char,
        #[source]
        source: ProviderError,
    },
}

type Catalog = HashMap<char, Vec<Arc<Emote>>>;

#[derive(Default)]
struct StoreInner {
    /// Globally available emotes, per provider.
    globals: Catalog,
    /// Emotes requested by id but absent from every catalog, resolved once.
    dangling: Catalog,
    channels: HashMap<String, Catalog>,
    channel_times: HashMap<String, Instant>,
    /// Per channel: typed emote name -> emote.
    word_maps: HashMap<String, HashMap<String, Arc<Emote>>>,
    /// Lowercased channel name -> channel id, recorded from ROOMSTATE.
    channel_names: HashMap<String, String>,
}

/// Global and per-channel emote catalogs for every provider.
pub struct EmoteStore {
    providers: Vec<Box<dyn Provider>>,
    inner: Mutex<StoreInner>,
}

impl EmoteStore {
    pub fn new() -> Self {
        Self::with_providers(default_providers())
    }

    pub fn with_providers(providers: Vec<Box<dyn Provider>>) -> Self {
        Self {
            providers,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Fetch every provider's global emotes. Any provider failure fails init.
    pub async fn init(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for provider in &self.providers {
            let code = provider.code();
            let globals = provider
                .load_globals()
                .await
                .map_err(|source| StoreError::Provider { code, source })?;
            tracing::info!(provider = %code, count = globals.len(), "Loaded global emotes");
            inner
                .globals
                .insert(code, globals.into_iter().map(Arc::new).collect());
        }
        Ok(())
    }

    /// Load a channel's catalogs unless a fresh copy is already present.
    pub async fn load_if_not_loaded(&self, channel_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.channels.contains_key(channel_id) {
            let fresh = inner
                .channel_times
                .get(channel_id)
                .is_some_and(|loaded| loaded.elapsed() <= CHANNEL_CATALOG_TTL);
            if fresh {
                return Ok(());
            }
            inner.channels.remove(channel_id);
            inner.channel_times.remove(channel_id);
        }
        self.load_locked(&mut inner, channel_id).await
    }

    /// Unconditionally (re)load a channel's catalogs.
    pub async fn load(&self, channel_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.load_locked(&mut inner, channel_id).await
    }

    async fn load_locked(
        &self,
        inner: &mut StoreInner,
        channel_id: &str,
    ) -> Result<(), StoreError> {
        let mut catalog = Catalog::new();
        for provider in &self.providers {
            let code = provider.code();
            let emotes = provider
                .load_channel(channel_id)
                .await
                .map_err(|source| StoreError::Provider { code, source })?;
            catalog.insert(code, emotes.into_iter().map(Arc::new).collect());
        }
        tracing::info!(
            channel_id,
            count = catalog.values().map(Vec::len).sum::<usize>(),
            "Loaded channel emotes"
        );
        inner.channels.insert(channel_id.to_owned(), catalog);
        inner
            .channel_times
            .insert(channel_id.to_owned(), Instant::now());
        self.rebuild_word_map(inner, channel_id);
        Ok(())
    }

    /// Rebuild a channel's name index. Providers are written in priority
    /// order (`b`, `f`, `s`; globals before channel catalogs) with later
    /// writes winning, so channel entries beat globals and 7TV beats FFZ
    /// beats BTTV on name conflicts.
    fn rebuild_word_map(&self, inner: &mut StoreInner, channel_id: &str) {
        let mut words: HashMap<String, Arc<Emote>> = HashMap::new();
        for provider in &self.providers {
            let code = provider.code();
            let Some(emotes) = inner.globals.get(&code) else {
                continue;
            };
            for emote in emotes {
                if code == 'b' && !emote.is_gif() {
                    // BTTV ships gif and non-gif globals under the same name;
                    // the gif stays
                    let gif_exists = words
                        .get(emote.name())
                        .is_some_and(|e| e.provider_code() == 'b' && e.is_gif());
                    if gif_exists {
                        continue;
                    }
                }
                words.insert(emote.name().to_owned(), Arc::clone(emote));
            }
        }
        if let Some(catalog) = inner.channels.get(channel_id) {
            for provider in &self.providers {
                let Some(emotes) = catalog.get(&provider.code()) else {
                    continue;
                };
                for emote in emotes {
                    words.insert(emote.name().to_owned(), Arc::clone(emote));
                }
            }
        }
        inner.word_maps.insert(channel_id.to_owned(), words);
    }

    /// Look an emote up by provider code and id, falling back to a one-off
    /// provider fetch that is memoized in the dangling list.
    pub async fn get(&self, code: char, emote_id: &str) -> Option<Arc<Emote>> {
        let mut inner = self.inner.lock().await;

        let in_globals = inner
            .globals
            .get(&code)
            .and_then(|emotes| emotes.iter().find(|e| e.id() == emote_id));
        if let Some(found) = in_globals {
            return Some(Arc::clone(found));
        }
        let in_channels = inner.channels.values().find_map(|catalog| {
            catalog
                .get(&code)
                .and_then(|emotes| emotes.iter().find(|e| e.id() == emote_id))
        });
        if let Some(found) = in_channels {
            return Some(Arc::clone(found));
        }
        let in_dangling = inner
            .dangling
            .get(&code)
            .and_then(|emotes| emotes.iter().find(|e| e.id() == emote_id));
        if let Some(found) = in_dangling {
            return Some(Arc::clone(found));
        }

        let provider = self.providers.iter().find(|p| p.code() == code)?;
        match provider.load_specific(emote_id).await {
            Ok(emote) => {
                let emote = Arc::new(emote);
                inner
                    .dangling
                    .entry(code)
                    .or_default()
                    .push(Arc::clone(&emote));
                Some(emote)
            }
            Err(err) => {
                tracing::debug!(
                    provider = %code,
                    emote_id,
                    error = %err,
                    "Dangling emote lookup failed"
                );
                None
            }
        }
    }

    /// Resolve a chat word against a channel's word map. Channels that were
    /// never loaded resolve nothing; loading is the session's job.
    pub async fn emote_for_word(&self, word: &str, channel_id: &str) -> Option<Arc<Emote>> {
        let inner = self.inner.lock().await;
        inner.word_maps.get(channel_id)?.get(word).map(Arc::clone)
    }

    /// Remember a channel's id as announced by ROOMSTATE.
    pub async fn record_channel_name(&self, channel_name: &str, channel_id: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .channel_names
            .insert(channel_name.to_lowercase(), channel_id.to_owned());
    }

    pub async fn channel_id_for(&self, channel_name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.channel_names.get(&channel_name.to_lowercase()).cloned()
    }
}

impl Default for EmoteStore {
    fn default() -> Self {
        Self::new()
    }
}
