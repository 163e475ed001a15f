use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use emote_store::ImageSize;
use image_cache::Half;

use crate::app::SharedState;
use crate::session::CACHE_DESTROYER_LEN;

/// An emote reference decoded from an emoticon URL id segment.
#[derive(Debug, PartialEq, Eq)]
struct EmoteRef {
    half: Option<Half>,
    code: char,
    id: String,
}

/// Serve `/emoticons/v1/<id>/<size>` and `/emoticons/v2/<id>/<fmt>/<theme>/<size>`
/// the way the Twitch emoticon CDN would.
pub async fn handle(state: &SharedState, path: &str) -> Response {
    let Some((raw_id, size_label, v2)) = parse_path(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(size) = ImageSize::from_cdn_label(size_label) else {
        tracing::warn!(size = size_label, "Unknown emoticon size");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(emote_ref) = parse_emote_id(raw_id) else {
        tracing::warn!(id = raw_id, "Unparseable emoticon id");
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(emote) = state.emote_store.get(emote_ref.code, &emote_ref.id).await else {
        tracing::warn!(
            code = %emote_ref.code,
            id = %emote_ref.id,
            "Requested emote was not found"
        );
        return StatusCode::NOT_FOUND.into_response();
    };

    // Without a local cache, for v2 requests naming a non-still source, and
    // for 7TV (whose payloads are never transcoded), hand out the upstream
    // URL instead of serving bytes.
    let redirect = state.image_cache.is_none()
        || (v2 && emote.image_type() != "png")
        || emote.provider_code() == 's';
    let Some(cache) = state.image_cache.as_ref().filter(|_| !redirect) else {
        return (StatusCode::FOUND, [(header::LOCATION, emote.url(size))]).into_response();
    };

    let result = match emote_ref.half {
        Some(half) => cache.get_or_build_half(&emote, size, half).await,
        None => cache.get_or_build(&emote, size).await,
    };
    match result {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            tracing::error!(error = %e, id = %emote_ref.id, "Building emoticon failed");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

fn parse_path(path: &str) -> Option<(&str, &str, bool)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["", "emoticons", "v1", id, size] => Some((id, size, false)),
        ["", "emoticons", "v2", id, _format, _theme, size] => Some((id, size, true)),
        _ => None,
    }
}

/// Id grammar: `[d<destroyer>]<code><rest>`, where a code of `v` is followed
/// by `l` or `r` and the real provider code.
fn parse_emote_id(raw: &str) -> Option<EmoteRef> {
    let mut rest = raw;
    if let Some(stripped) = rest.strip_prefix('d') {
        rest = stripped.get(CACHE_DESTROYER_LEN..)?;
    }
    let mut chars = rest.chars();
    let mut code = chars.next()?;
    let mut half = None;
    if code == 'v' {
        half = match chars.next()? {
            'l' => Some(Half::Left),
            'r' => Some(Half::Right),
            _ => return None,
        };
        code = chars.next()?;
    }
    if !matches!(code, 'b' | 'f' | 's') {
        return None;
    }
    let id: String = chars.collect();
    if id.is_empty() {
        return None;
    }
    Some(EmoteRef { half, code, id })
}
