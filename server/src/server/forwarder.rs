use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::response::{IntoResponse, Response};
use tokio_tungstenite::connect_async;

use crate::app::SharedState;
use crate::session::Session;

const TWITCH_IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Upgrade an incoming request and run it as a proxy session.
pub async fn upgrade(state: SharedState, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    upgrade
        .write_buffer_size(1024)
        .on_upgrade(move |client| handle_connection(client, state))
        .into_response()
}

async fn handle_connection(client: WebSocket, state: SharedState) {
    let (twitch, _) = match connect_async(TWITCH_IRC_WS_URL).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(error = %e, "Connecting to Twitch IRC failed");
            return;
        }
    };

    tracing::info!("Client connected");
    let session = Session::new(
        state.emote_store.clone(),
        state.image_cache.clone(),
        state.settings.clone(),
        state.config.include_gifs,
        state.shutdown.clone(),
    );
    session.run(client, twitch).await;
    tracing::info!("Client disconnected");
}
