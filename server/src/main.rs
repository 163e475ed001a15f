//! Intercepting proxy for Twitch mobile chat that disguises BetterTTV,
//! FrankerFaceZ, and 7TV emotes as first-party Twitch emotes, plus an
//! emoticon-CDN impersonator that serves the synthesized images.

mod app;
mod cli;
mod server;
mod session;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use emote_store::EmoteStore;
use image_cache::{ImageFileCache, DEFAULT_EXPIRATION};
use image_pipeline::IdealFrames;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::app::{AppContext, ServerConfig, SharedState};
use crate::storage::{RedisSettingsRepository, SettingsRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();
    let shutdown = CancellationToken::new();

    let emote_store = Arc::new(EmoteStore::new());
    emote_store
        .init()
        .await
        .context("load global emotes")?;

    let ideal_frames = match &args.ideal_gifs {
        Some(path) => IdealFrames::load(path)
            .with_context(|| format!("read ideal-gif file {}", path.display()))?,
        None => IdealFrames::empty(),
    };

    let image_cache = match &args.cache {
        Some(dir) => {
            let cache = Arc::new(ImageFileCache::new(
                dir.clone(),
                DEFAULT_EXPIRATION,
                true,
                ideal_frames,
            ));
            cache.index().await.context("index image cache")?;
            if args.purge {
                cache.purge().await.context("purge image cache")?;
                tracing::info!("Purged image cache");
            }
            let evict_cache = Arc::clone(&cache);
            let evict_token = shutdown.clone();
            tokio::spawn(async move { evict_cache.auto_evict(evict_token).await });
            Some(cache)
        }
        None => {
            tracing::info!("No cache directory configured, images will redirect upstream");
            None
        }
    };

    let settings = match &args.redis_url {
        Some(url) => {
            let repo = RedisSettingsRepository::connect(url, &args.redis_namespace)
                .await
                .context("connect to redis")?;
            tracing::info!("Connected to Redis settings store");
            Some(Arc::new(repo) as Arc<dyn SettingsRepository>)
        }
        None => None,
    };

    let state: SharedState = Arc::new(AppContext {
        config: ServerConfig::from_args(&args),
        emote_store,
        image_cache,
        settings,
        shutdown: shutdown.clone(),
    });

    let result = server::run(state).await;
    shutdown.cancel();
    result
}
