//! One proxied chat connection: a client WebSocket and a Twitch WebSocket
//! tied together by two line-oriented pipes.

mod commands;
mod handler;
mod modifier;
mod socket;
#[cfg(test)]
mod tests;
mod twitch_api;

use std::sync::Arc;

use emote_store::EmoteStore;
use image_cache::ImageFileCache;
use irc_codec::Message;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::storage::{SettingsRepository, UserSettings};
use socket::{CloseInfo, Frame, SocketReader, SocketWriter};

pub use handler::Disposition;

/// Length of the per-user cache-destroyer token embedded in emoticon URLs.
pub const CACHE_DESTROYER_LEN: usize = 8;

/// Mutable per-connection state, shared with detached background tasks.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    pub username: String,
    pub user_id: Option<String>,
    pub greeted: bool,
    pub settings: Option<UserSettings>,
}

#[derive(Default)]
pub struct SessionShared {
    pub(crate) state: Mutex<SessionState>,
}

type SharedWriter = Arc<Mutex<Box<dyn SocketWriter>>>;

/// Everything a pipe task needs; cheap to clone.
#[derive(Clone)]
pub(crate) struct SessionCtx {
    pub store: Arc<EmoteStore>,
    pub cache: Option<Arc<ImageFileCache>>,
    pub repo: Option<Arc<dyn SettingsRepository>>,
    pub default_include_gifs: bool,
    pub shared: Arc<SessionShared>,
    pub client_writer: SharedWriter,
    pub twitch_writer: SharedWriter,
    /// Cancelled when either pipe ends or the server shuts down.
    pub stop: CancellationToken,
}

pub struct Session {
    store: Arc<EmoteStore>,
    cache: Option<Arc<ImageFileCache>>,
    repo: Option<Arc<dyn SettingsRepository>>,
    default_include_gifs: bool,
    shutdown: CancellationToken,
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn new(
        store: Arc<EmoteStore>,
        cache: Option<Arc<ImageFileCache>>,
        repo: Option<Arc<dyn SettingsRepository>>,
        default_include_gifs: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            cache,
            repo,
            default_include_gifs,
            shutdown,
            shared: Arc::new(SessionShared::default()),
        }
    }

    /// Per-connection state, observable while the session runs.
    pub fn shared(&self) -> Arc<SessionShared> {
        Arc::clone(&self.shared)
    }

    /// Run the session until either side disconnects or the server stops.
    pub async fn run(self, client: axum::extract::ws::WebSocket, twitch: socket::TwitchSocket) {
        let (client_reader, client_writer) = socket::split_client(client);
        let (twitch_reader, twitch_writer) = socket::split_twitch(twitch);
        self.run_split(
            Box::new(client_reader),
            Box::new(client_writer),
            Box::new(twitch_reader),
            Box::new(twitch_writer),
        )
        .await;
    }

    pub(crate) async fn run_split(
        self,
        client_reader: Box<dyn SocketReader>,
        client_writer: Box<dyn SocketWriter>,
        twitch_reader: Box<dyn SocketReader>,
        twitch_writer: Box<dyn SocketWriter>,
    ) {
        let ctx = SessionCtx {
            store: self.store,
            cache: self.cache,
            repo: self.repo,
            default_include_gifs: self.default_include_gifs,
            shared: self.shared,
            client_writer: Arc::new(Mutex::new(client_writer)),
            twitch_writer: Arc::new(Mutex::new(twitch_writer)),
            stop: self.shutdown.child_token(),
        };

        let downstream = tokio::spawn(run_pipe(ctx.clone(), twitch_reader, Direction::Downstream));
        let upstream = tokio::spawn(run_pipe(ctx.clone(), client_reader, Direction::Upstream));
        let _ = downstream.await;
        let _ = upstream.await;

        // both pipes are done; make sure each peer got a goodbye
        let _ = write_close(&ctx.client_writer, CloseInfo::normal()).await;
        let _ = write_close(&ctx.twitch_writer, CloseInfo::normal()).await;
    }
}

/// Which way a pipe moves frames.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Twitch -> client, with emote injection.
    Downstream,
    /// Client -> Twitch, with command interception.
    Upstream,
}

impl Direction {
    fn source_name(self) -> &'static str {
        match self {
            Direction::Downstream => "twitch",
            Direction::Upstream => "client",
        }
    }

    fn dest_writer(self, ctx: &SessionCtx) -> &SharedWriter {
        match self {
            Direction::Downstream => &ctx.client_writer,
            Direction::Upstream => &ctx.twitch_writer,
        }
    }

    fn source_writer(self, ctx: &SessionCtx) -> &SharedWriter {
        match self {
            Direction::Downstream => &ctx.twitch_writer,
            Direction::Upstream => &ctx.client_writer,
        }
    }
}

/// Strict-FIFO forwarding of one direction. Ends on read error, write error,
/// or cancellation, and cancels the sibling pipe on the way out.
async fn run_pipe(ctx: SessionCtx, mut reader: Box<dyn SocketReader>, direction: Direction) {
    loop {
        let frame = tokio::select! {
            _ = ctx.stop.cancelled() => break,
            frame = reader.next_frame() => frame,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                if !err.is_clean_close() {
                    tracing::warn!(
                        error = %err,
                        side = direction.source_name(),
                        "Connection read failed"
                    );
                }
                let _ = write_close(direction.dest_writer(&ctx), err.close_reply()).await;
                break;
            }
        };
        let ok = match frame {
            Frame::Binary(data) => forward_frame(&ctx, direction, Frame::Binary(data)).await,
            Frame::Text(payload) => handle_text_frame(&ctx, direction, &payload).await,
        };
        if !ok {
            break;
        }
    }
    ctx.stop.cancel();
}

/// Frames may carry several CRLF-terminated IRC lines; each is handled and
/// forwarded (or suppressed) on its own. A line that cannot be parsed or
/// handled is passed through untouched so the stream keeps flowing.
async fn handle_text_frame(ctx: &SessionCtx, direction: Direction, payload: &str) -> bool {
    for line in payload.split("\r\n").filter(|line| !line.is_empty()) {
        let out = process_line(ctx, direction, line).await;
        if let Some(out) = out {
            if !forward_frame(ctx, direction, Frame::Text(out)).await {
                return false;
            }
        }
    }
    true
}

async fn process_line(ctx: &SessionCtx, direction: Direction, line: &str) -> Option<String> {
    let mut msg = match Message::parse(line) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, line, "Unparseable IRC line");
            return Some(raw_line(line));
        }
    };
    let handled = match direction {
        Direction::Downstream => ctx.handle_twitch(&mut msg).await,
        Direction::Upstream => ctx.handle_client(&mut msg).await,
    };
    match handled {
        Ok(Disposition::ForwardModified) => Some(format!("{msg}\r\n")),
        Ok(Disposition::Forward) => Some(raw_line(line)),
        Ok(Disposition::Suppress) => None,
        Err(e) => {
            tracing::warn!(error = %e, line, "Handling IRC line failed");
            Some(raw_line(line))
        }
    }
}

async fn forward_frame(ctx: &SessionCtx, direction: Direction, frame: Frame) -> bool {
    if let Err(e) = write_frame(direction.dest_writer(ctx), frame).await {
        if !e.is_clean_close() {
            tracing::warn!(error = %e, side = direction.source_name(), "Forwarding frame failed");
        }
        let _ = write_close(direction.source_writer(ctx), CloseInfo::normal()).await;
        return false;
    }
    true
}

fn raw_line(line: &str) -> String {
    format!("{line}\r\n")
}

async fn write_frame(writer: &SharedWriter, frame: Frame) -> Result<(), socket::SocketError> {
    writer.lock().await.send_frame(frame).await
}

async fn write_close(writer: &SharedWriter, close: CloseInfo) -> Result<(), socket::SocketError> {
    writer.lock().await.send_close(close).await
}
