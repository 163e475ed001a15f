use std::path::PathBuf;

use clap::Parser;

/// Transparent proxy that injects third-party emotes into Twitch mobile chat.
#[derive(Debug, Parser)]
#[command(name = "emote-server", version)]
pub struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub address: String,

    /// Host header expected on WebSocket IRC requests
    #[arg(long = "ws-host", default_value = "irc-ws.proxy")]
    pub ws_host: String,

    /// Host header expected on emoticon image requests
    #[arg(long = "emoticon-host", default_value = "emoticon.proxy")]
    pub emoticon_host: String,

    /// Disable gif emotes for users without saved settings
    #[arg(long = "no-gifs")]
    pub no_gifs: bool,

    /// Directory for the processed-image cache; omit to redirect to the
    /// upstream CDNs instead
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Empty the image cache on startup
    #[arg(long)]
    pub purge: bool,

    /// File of `code:id:frame` directives picking still frames for gifs
    #[arg(long = "ideal-gifs")]
    pub ideal_gifs: Option<PathBuf>,

    /// Redis URL for per-user settings; omit to disable settings
    #[arg(long = "redis-url")]
    pub redis_url: Option<String>,

    /// Key namespace in Redis
    #[arg(long = "redis-namespace", default_value = "tme")]
    pub redis_namespace: String,
}
