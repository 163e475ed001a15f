use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use emote_store::{BttvEmote, Provider, ProviderError, SevenTvEmote};
use image_cache::{EmoteFetcher, FetchError, ImageFileCache, DEFAULT_EXPIRATION};
use image::{DynamicImage, Rgba, RgbaImage};

use super::socket::{CloseInfo, SocketError, CLOSE_NORMAL};
use super::*;
use crate::storage::memory::MemorySettingsRepository;

// --- fakes -----------------------------------------------------------------

struct ScriptedReader {
    frames: VecDeque<Frame>,
    final_error: Option<SocketError>,
}

impl ScriptedReader {
    fn lines(lines: &[&str]) -> Self {
        Self {
            frames: lines
                .iter()
                .map(|line| Frame::Text((*line).to_owned()))
                .collect(),
            final_error: None,
        }
    }

    fn closing_with(mut self, close: CloseInfo) -> Self {
        self.final_error = Some(SocketError::Closed(Some(close)));
        self
    }
}

#[async_trait]
impl SocketReader for ScriptedReader {
    async fn next_frame(&mut self) -> Result<Frame, SocketError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => Err(self
                .final_error
                .take()
                .unwrap_or(SocketError::Closed(None))),
        }
    }
}

/// A reader that never yields; the pipe ends via cancellation.
struct PendingReader;

#[async_trait]
impl SocketReader for PendingReader {
    async fn next_frame(&mut self) -> Result<Frame, SocketError> {
        futures_util::future::pending().await
    }
}

#[derive(Clone, Default)]
struct Recorder {
    frames: Arc<StdMutex<Vec<Frame>>>,
    closes: Arc<StdMutex<Vec<CloseInfo>>>,
}

impl Recorder {
    fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text.clone()),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    fn close_frames(&self) -> Vec<CloseInfo> {
        self.closes.lock().unwrap().clone()
    }
}

struct RecordingWriter(Recorder);

#[async_trait]
impl SocketWriter for RecordingWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        self.0.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn send_close(&mut self, close: CloseInfo) -> Result<(), SocketError> {
        self.0.closes.lock().unwrap().push(close);
        Ok(())
    }
}

#[derive(Default)]
struct FakeProvider {
    code: char,
    globals: Vec<emote_store::Emote>,
    channel: Vec<emote_store::Emote>,
    channel_loads: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for FakeProvider {
    fn code(&self) -> char {
        self.code
    }

    async fn load_globals(&self) -> Result<Vec<emote_store::Emote>, ProviderError> {
        Ok(self.globals.clone())
    }

    async fn load_channel(
        &self,
        _channel_id: &str,
    ) -> Result<Vec<emote_store::Emote>, ProviderError> {
        self.channel_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.channel.clone())
    }

    async fn load_specific(
        &self,
        _emote_id: &str,
    ) -> Result<emote_store::Emote, ProviderError> {
        Err(ProviderError::Status {
            provider: "fake",
            status: 404,
            url: String::new(),
        })
    }
}

fn bttv_emote(id: &str, name: &str, image_type: &str) -> emote_store::Emote {
    emote_store::Emote::Bttv(BttvEmote {
        id: id.to_owned(),
        code: name.to_owned(),
        image_type: image_type.to_owned(),
    })
}

fn seventv_emote(id: &str, name: &str) -> emote_store::Emote {
    emote_store::Emote::SevenTv(SevenTvEmote {
        id: id.to_owned(),
        name: name.to_owned(),
        mime: "image/png".to_owned(),
        urls: Vec::new(),
    })
}

/// Store with BTTV `Kappa` (id `abc`, png) and a gif `DanceGif` (id `ggg`)
/// in globals, plus 7TV `monkaW` (id `xyz`) and the two-rune `oh` (id `o2`)
/// in channel 44322889.
fn seeded_store() -> (Arc<EmoteStore>, Arc<AtomicUsize>) {
    let bttv = FakeProvider {
        code: 'b',
        globals: vec![
            bttv_emote("abc", "Kappa", "png"),
            bttv_emote("ggg", "DanceGif", "gif"),
        ],
        ..Default::default()
    };
    let loads = Arc::clone(&bttv.channel_loads);
    let seventv = FakeProvider {
        code: 's',
        channel: vec![seventv_emote("xyz", "monkaW"), seventv_emote("o2", "oh")],
        ..Default::default()
    };
    let store = Arc::new(EmoteStore::with_providers(vec![
        Box::new(bttv),
        Box::new(seventv),
    ]));
    (store, loads)
}

struct FakeFetcher {
    width: u32,
    height: u32,
}

#[async_trait]
impl EmoteFetcher for FakeFetcher {
    async fn fetch_image(
        &self,
        _emote: &emote_store::Emote,
        _size: emote_store::ImageSize,
    ) -> Result<DynamicImage, FetchError> {
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([0, 0, 0, 255]),
        )))
    }

    async fn fetch_dimensions(
        &self,
        _emote: &emote_store::Emote,
    ) -> Result<(u32, u32), FetchError> {
        Ok((self.width, self.height))
    }
}

fn wide_cache(dir: &std::path::Path) -> Arc<ImageFileCache> {
    Arc::new(ImageFileCache::with_fetcher(
        dir.to_path_buf(),
        DEFAULT_EXPIRATION,
        true,
        Box::new(FakeFetcher {
            width: 56,
            height: 28,
        }),
    ))
}

struct TestSession {
    ctx: SessionCtx,
    client: Recorder,
    twitch: Recorder,
}

fn make_ctx(
    store: Arc<EmoteStore>,
    cache: Option<Arc<ImageFileCache>>,
    repo: Option<Arc<dyn crate::storage::SettingsRepository>>,
    include_gifs: bool,
) -> TestSession {
    let client = Recorder::default();
    let twitch = Recorder::default();
    let ctx = SessionCtx {
        store,
        cache,
        repo,
        default_include_gifs: include_gifs,
        shared: Arc::new(SessionShared::default()),
        client_writer: Arc::new(Mutex::new(
            Box::new(RecordingWriter(client.clone())) as Box<dyn SocketWriter>
        )),
        twitch_writer: Arc::new(Mutex::new(
            Box::new(RecordingWriter(twitch.clone())) as Box<dyn SocketWriter>
        )),
        stop: CancellationToken::new(),
    };
    TestSession {
        ctx,
        client,
        twitch,
    }
}

async fn run_session(
    session: Session,
    client_reader: impl SocketReader + 'static,
    twitch_reader: impl SocketReader + 'static,
) -> (Recorder, Recorder) {
    let client = Recorder::default();
    let twitch = Recorder::default();
    session
        .run_split(
            Box::new(client_reader),
            Box::new(RecordingWriter(client.clone())),
            Box::new(twitch_reader),
            Box::new(RecordingWriter(twitch.clone())),
        )
        .await;
    (client, twitch)
}

fn plain_session(store: Arc<EmoteStore>) -> Session {
    Session::new(store, None, None, true, CancellationToken::new())
}

// --- pipe flow -------------------------------------------------------------

#[tokio::test]
async fn test_nick_is_forwarded_and_recorded() {
    let (store, _) = seeded_store();
    let session = plain_session(store);
    let shared = session.shared();

    let (_client, twitch) = run_session(
        session,
        ScriptedReader::lines(&["NICK alice\r\n"]),
        PendingReader,
    )
    .await;

    assert_eq!(twitch.texts(), vec!["NICK alice\r\n"]);
    let state = shared.state.lock().await;
    assert!(state.greeted);
    assert_eq!(state.username, "alice");
}

#[tokio::test]
async fn test_roomstate_loads_channel_and_forwards_unchanged() {
    let (store, loads) = seeded_store();
    store.init().await.unwrap();
    let session = plain_session(Arc::clone(&store));

    let line = "@room-id=44322889 :tmi.twitch.tv ROOMSTATE #dallas\r\n";
    let (client, _twitch) =
        run_session(session, PendingReader, ScriptedReader::lines(&[line])).await;

    assert_eq!(client.texts(), vec![line.to_owned()]);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.channel_id_for("#dallas").await.as_deref(),
        Some("44322889")
    );
}

#[tokio::test]
async fn test_privmsg_gets_injected_emote_tag() {
    let (store, _) = seeded_store();
    store.init().await.unwrap();
    let session = plain_session(store);

    let (client, _twitch) = run_session(
        session,
        PendingReader,
        ScriptedReader::lines(&[
            "@room-id=44322889 :tmi.twitch.tv ROOMSTATE #dallas\r\n",
            "@emotes=;room-id=44322889 :u!u@u.tmi.twitch.tv PRIVMSG #dallas :hi Kappa\r\n",
        ]),
    )
    .await;

    let texts = client.texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(
        texts[1],
        "@emotes=babc:3-7;room-id=44322889 :u!u@u.tmi.twitch.tv PRIVMSG #dallas :hi Kappa\r\n"
    );
}

#[tokio::test]
async fn test_multiple_lines_in_one_frame_stay_ordered() {
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let (_client, twitch) = run_session(
        session,
        ScriptedReader::lines(&["PASS oauth:tok\r\nNICK alice\r\nJOIN #dallas\r\n"]),
        PendingReader,
    )
    .await;

    assert_eq!(
        twitch.texts(),
        vec!["PASS oauth:tok\r\n", "NICK alice\r\n", "JOIN #dallas\r\n"]
    );
}

#[tokio::test]
async fn test_unparseable_line_is_forwarded_raw() {
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let (client, _twitch) = run_session(
        session,
        PendingReader,
        ScriptedReader::lines(&["@tags-without-a-command\r\n"]),
    )
    .await;

    assert_eq!(client.texts(), vec!["@tags-without-a-command\r\n"]);
}

#[tokio::test]
async fn test_handler_error_forwards_raw_line() {
    // PRIVMSG without a room-id tag cannot be injected; it must still flow
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let line = ":u!u@u.tmi.twitch.tv PRIVMSG #dallas :hi Kappa\r\n";
    let (client, _twitch) =
        run_session(session, PendingReader, ScriptedReader::lines(&[line])).await;

    assert_eq!(client.texts(), vec![line.to_owned()]);
}

#[tokio::test]
async fn test_peer_close_status_is_mirrored() {
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let reader = ScriptedReader::lines(&[]).closing_with(CloseInfo {
        code: 1001,
        reason: "going away".to_owned(),
    });
    let (_client, twitch) = run_session(session, reader, PendingReader).await;

    let closes = twitch.close_frames();
    assert_eq!(closes[0].code, 1001);
    assert_eq!(closes[0].reason, "going away");
}

#[tokio::test]
async fn test_silent_close_becomes_normal_closure() {
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let (_client, twitch) =
        run_session(session, ScriptedReader::lines(&[]), PendingReader).await;

    assert_eq!(twitch.close_frames()[0].code, CLOSE_NORMAL);
}

#[tokio::test]
async fn test_binary_frames_pass_through() {
    let (store, _) = seeded_store();
    let session = plain_session(store);

    let mut reader = ScriptedReader::lines(&[]);
    reader.frames.push_back(Frame::Binary(vec![1, 2, 3]));
    let (_client, twitch) = run_session(session, reader, PendingReader).await;

    assert_eq!(
        twitch.frames.lock().unwrap().first(),
        Some(&Frame::Binary(vec![1, 2, 3]))
    );
}

// --- injection -------------------------------------------------------------

async fn loaded_ctx(
    cache: Option<Arc<ImageFileCache>>,
    include_gifs: bool,
) -> TestSession {
    let (store, _) = seeded_store();
    store.init().await.unwrap();
    store.load("44322889").await.unwrap();
    make_ctx(store, cache, None, include_gifs)
}

fn privmsg(body: &str) -> Message {
    Message::parse(&format!(
        "@emotes=;room-id=44322889 :u!u@u.tmi.twitch.tv PRIVMSG #dallas :{body}"
    ))
    .unwrap()
}

#[tokio::test]
async fn test_wide_emote_splits_into_halves() {
    let dir = tempfile::tempdir().unwrap();
    let test = loaded_ctx(Some(wide_cache(dir.path())), true).await;

    let mut msg = privmsg("hi monkaW");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    assert_eq!(msg.tag("emotes"), Some("vlsxyz:3-4/vrsxyz:5-8"));
}

#[tokio::test]
async fn test_wide_emote_with_two_runes_stays_single() {
    let dir = tempfile::tempdir().unwrap();
    // the fake fetcher reports every emote as 2:1
    let test = loaded_ctx(Some(wide_cache(dir.path())), true).await;

    // a two-rune word cannot hold both halves; one id covers it
    let mut msg = privmsg("oh");
    test.ctx.handle_twitch(&mut msg).await.unwrap();
    assert_eq!(msg.tag("emotes"), Some("so2:0-1"));

    // at three runes the split kicks in
    let mut msg = privmsg("monkaW");
    test.ctx.handle_twitch(&mut msg).await.unwrap();
    assert_eq!(msg.tag("emotes"), Some("vlsxyz:0-1/vrsxyz:2-5"));
}

#[tokio::test]
async fn test_without_cache_no_split_happens() {
    let test = loaded_ctx(None, true).await;

    let mut msg = privmsg("monkaW");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    assert_eq!(msg.tag("emotes"), Some("sxyz:0-5"));
}

#[tokio::test]
async fn test_gif_gate_respects_settings() {
    let test = loaded_ctx(None, false).await;

    let mut msg = privmsg("DanceGif");
    test.ctx.handle_twitch(&mut msg).await.unwrap();
    assert_eq!(msg.tag("emotes"), Some(""));

    // gifs enabled through loaded settings
    test.ctx.shared.state.lock().await.settings = Some(crate::storage::UserSettings {
        cache_destroyer_key: String::new(),
        enable_gif_emotes: true,
    });
    let mut msg = privmsg("DanceGif");
    test.ctx.handle_twitch(&mut msg).await.unwrap();
    assert_eq!(msg.tag("emotes"), Some("bggg:0-7"));
}

#[tokio::test]
async fn test_rune_indexing_counts_emoji_as_one() {
    let test = loaded_ctx(None, true).await;

    // the emoji is 4 utf-8 bytes but one rune
    let mut msg = privmsg("\u{1F600} Kappa");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    assert_eq!(msg.tag("emotes"), Some("babc:2-6"));
}

#[tokio::test]
async fn test_action_body_reslices_and_restarts_indices() {
    let test = loaded_ctx(None, true).await;

    let mut msg = privmsg("\u{1}ACTION Kappa waves\u{1}");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    // ranges are relative to the searched substring, not the full trailing
    assert_eq!(msg.tag("emotes"), Some("babc:0-4"));
}

#[tokio::test]
async fn test_destroyer_key_prefixes_ids() {
    let test = loaded_ctx(None, true).await;
    test.ctx.shared.state.lock().await.settings = Some(crate::storage::UserSettings {
        cache_destroyer_key: "12345678".to_owned(),
        enable_gif_emotes: true,
    });

    let mut msg = privmsg("hi Kappa");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    assert_eq!(msg.tag("emotes"), Some("d12345678babc:3-7"));
}

#[tokio::test]
async fn test_malformed_destroyer_key_is_regenerated() {
    let (store, _) = seeded_store();
    store.init().await.unwrap();
    store.load("44322889").await.unwrap();
    let repo = Arc::new(MemorySettingsRepository::default());
    let test = make_ctx(store, None, Some(Arc::clone(&repo) as Arc<dyn crate::storage::SettingsRepository>), true);
    {
        let mut state = test.ctx.shared.state.lock().await;
        state.user_id = Some("501".to_owned());
        state.settings = Some(crate::storage::UserSettings {
            cache_destroyer_key: "short".to_owned(),
            enable_gif_emotes: true,
        });
    }

    let mut msg = privmsg("Kappa");
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    let state = test.ctx.shared.state.lock().await;
    let key = &state.settings.as_ref().unwrap().cache_destroyer_key;
    assert_eq!(key.len(), CACHE_DESTROYER_LEN);
    assert_eq!(
        msg.tag("emotes"),
        Some(format!("d{key}babc:0-4").as_str())
    );
    drop(state);

    // the regenerated key is persisted in the background
    tokio::time::sleep(Duration::from_millis(50)).await;
    let saved = repo.entries.lock().await;
    assert_eq!(saved.get("501").unwrap().cache_destroyer_key.len(), 8);
}

#[tokio::test]
async fn test_existing_emote_ranges_are_kept() {
    let test = loaded_ctx(None, true).await;

    let mut msg = Message::parse(
        "@emotes=25:0-4;room-id=44322889 :u!u@u.tmi.twitch.tv PRIVMSG #dallas :hello Kappa",
    )
    .unwrap();
    test.ctx.handle_twitch(&mut msg).await.unwrap();

    assert_eq!(msg.tag("emotes"), Some("25:0-4/babc:6-10"));
}

// --- commands --------------------------------------------------------------

fn command_privmsg(body: &str) -> Message {
    Message::parse(&format!(":alice!alice@alice.tmi.twitch.tv PRIVMSG #dallas :{body}")).unwrap()
}

#[tokio::test]
async fn test_gifs_off_command_replies_and_saves() {
    let (store, _) = seeded_store();
    let repo = Arc::new(MemorySettingsRepository::default());
    let test = make_ctx(store, None, Some(Arc::clone(&repo) as Arc<dyn crate::storage::SettingsRepository>), true);
    {
        let mut state = test.ctx.shared.state.lock().await;
        state.user_id = Some("501".to_owned());
        state.greeted = true;
        state.username = "alice".to_owned();
        state.settings = Some(crate::storage::UserSettings {
            cache_destroyer_key: String::new(),
            enable_gif_emotes: true,
        });
    }

    let mut msg = command_privmsg("@@gifs off");
    let disposition = test.ctx.handle_client(&mut msg).await.unwrap();
    assert_eq!(disposition, Disposition::Suppress);

    let texts = test.client.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("PRIVMSG #dallas :Disabled gif emotes"));
    assert!(texts[0].contains("display-name=Mobile\\sEmotes"));
    assert!(test.twitch.texts().is_empty());

    assert!(
        !test
            .ctx
            .shared
            .state
            .lock()
            .await
            .settings
            .as_ref()
            .unwrap()
            .enable_gif_emotes
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let saved = repo.entries.lock().await;
    assert!(!saved.get("501").unwrap().enable_gif_emotes);
}

#[tokio::test]
async fn test_gifs_usage_reply_on_bad_args() {
    let (store, _) = seeded_store();
    let test = make_ctx(store, None, None, true);
    test.ctx.shared.state.lock().await.settings = Some(crate::storage::UserSettings {
        cache_destroyer_key: String::new(),
        enable_gif_emotes: true,
    });

    let mut msg = command_privmsg("@@gifs sometimes");
    test.ctx.handle_client(&mut msg).await.unwrap();

    assert!(test.client.texts()[0].contains("Usage: gifs [on|off]"));
}

#[tokio::test]
async fn test_cache_command_requires_settings() {
    let (store, _) = seeded_store();
    let test = make_ctx(store, None, None, true);

    let mut msg = command_privmsg("@@cache");
    let disposition = test.ctx.handle_client(&mut msg).await.unwrap();

    assert_eq!(disposition, Disposition::Suppress);
    assert!(test.client.texts()[0].contains("Error: User settings are not enabled"));
}

#[tokio::test]
async fn test_cache_command_sets_and_clears_key() {
    let (store, _) = seeded_store();
    let repo = Arc::new(MemorySettingsRepository::default());
    let test = make_ctx(store, None, Some(Arc::clone(&repo) as Arc<dyn crate::storage::SettingsRepository>), true);
    {
        let mut state = test.ctx.shared.state.lock().await;
        state.user_id = Some("501".to_owned());
        state.settings = Some(crate::storage::UserSettings {
            cache_destroyer_key: String::new(),
            enable_gif_emotes: true,
        });
    }

    let mut msg = command_privmsg("@@cache");
    test.ctx.handle_client(&mut msg).await.unwrap();
    let key = {
        let state = test.ctx.shared.state.lock().await;
        state.settings.as_ref().unwrap().cache_destroyer_key.clone()
    };
    assert_eq!(key.len(), CACHE_DESTROYER_LEN);
    assert!(test.client.texts()[0].contains(&format!("Set new cache destroyer value to {key}")));

    let mut msg = command_privmsg("@@cache off");
    test.ctx.handle_client(&mut msg).await.unwrap();
    let state = test.ctx.shared.state.lock().await;
    assert!(state.settings.as_ref().unwrap().cache_destroyer_key.is_empty());
    assert!(test.client.texts()[1].contains("Removed cache destroyer value"));
}

#[tokio::test]
async fn test_help_command_replies_with_every_line() {
    let (store, _) = seeded_store();
    let test = make_ctx(store, None, None, true);

    let mut msg = command_privmsg("@@help");
    test.ctx.handle_client(&mut msg).await.unwrap();

    let texts = test.client.texts();
    assert_eq!(texts.len(), 6);
    assert!(texts[0].contains("Twitch Mobile Emotes Help"));
    assert!(texts[5].contains("@@help - Show this message"));
}

#[tokio::test]
async fn test_reload_command_reloads_and_mentions_user() {
    let (store, loads) = seeded_store();
    store.init().await.unwrap();
    store.record_channel_name("#dallas", "44322889").await;
    let test = make_ctx(Arc::clone(&store), None, None, true);
    {
        let mut state = test.ctx.shared.state.lock().await;
        state.greeted = true;
        state.username = "alice".to_owned();
    }

    let mut msg = command_privmsg("@@reload");
    let disposition = test.ctx.handle_client(&mut msg).await.unwrap();

    assert_eq!(disposition, Disposition::Suppress);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(test.client.texts()[0].contains("@alice, reloaded BTTV and FFZ emotes"));
}

#[tokio::test]
async fn test_plain_chat_is_not_intercepted() {
    let (store, _) = seeded_store();
    let test = make_ctx(store, None, None, true);

    let mut msg = command_privmsg("hello @@world mid-message");
    let disposition = test.ctx.handle_client(&mut msg).await.unwrap();

    assert_eq!(disposition, Disposition::Forward);
    assert!(test.client.texts().is_empty());
}
