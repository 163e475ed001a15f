use std::sync::Arc;

use emote_store::EmoteStore;
use image_cache::ImageFileCache;
use tokio_util::sync::CancellationToken;

use crate::cli::Args;
use crate::storage::SettingsRepository;

/// Static server configuration derived from the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub ws_host: String,
    pub emoticon_host: String,
    /// Whether gif emotes are injected for users without saved settings.
    pub include_gifs: bool,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            address: args.address.clone(),
            ws_host: args.ws_host.clone(),
            emoticon_host: args.emoticon_host.clone(),
            include_gifs: !args.no_gifs,
        }
    }
}

/// Application state shared by every request handler and session.
pub struct AppContext {
    pub config: ServerConfig,
    pub emote_store: Arc<EmoteStore>,
    pub image_cache: Option<Arc<ImageFileCache>>,
    pub settings: Option<Arc<dyn SettingsRepository>>,
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<AppContext>;
