pub mod emoticons;
pub mod forwarder;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::app::SharedState;

/// Bind the listener and serve until interrupted.
pub async fn run(state: SharedState) -> anyhow::Result<()> {
    let address = state.config.address.clone();
    let shutdown = state.shutdown.clone();
    let app = Router::new().fallback(dispatch).with_state(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("bind {address}"))?;
    tracing::info!(%address, "Proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupt received, shutting down"),
                _ = shutdown.cancelled() => {}
            }
            // release active sessions so the server can drain
            shutdown.cancel();
        })
        .await?;
    Ok(())
}

/// All routing happens on the Host header: one host upgrades into the chat
/// proxy, the other impersonates the Twitch emoticon CDN.
async fn dispatch(State(state): State<SharedState>, req: Request) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    if host == state.config.ws_host {
        forwarder::upgrade(state, req).await
    } else if host == state.config.emoticon_host {
        let path = req.uri().path().to_owned();
        emoticons::handle(&state, &path).await
    } else {
        tracing::warn!(%host, "Request for unexpected host");
        StatusCode::NOT_FOUND.into_response()
    }
}
