//! Content-addressed on-disk cache of processed emote images.
//!
//! One flat directory of PNG files whose stem is the cache key; the file
//! mtime is the authoritative age. A single async mutex spans the whole
//! miss path, so concurrent requests for the same key never trigger more
//! than one upstream download.

mod fetch;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use emote_store::{Emote, ImageSize};
use image_pipeline::IdealFrames;
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub use fetch::{EmoteFetcher, FetchError, HttpFetcher};

/// Cached images expire after two days by default.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(48 * 60 * 60);

const EVICTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Pipeline(#[from] image_pipeline::PipelineError),
}

/// Which square of a wide emote a virtual id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Left,
    Right,
}

impl Half {
    pub fn letter(self) -> char {
        match self {
            Half::Left => 'l',
            Half::Right => 'r',
        }
    }
}

struct Entry {
    path: PathBuf,
    created: SystemTime,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    aspect_ratios: HashMap<String, f64>,
}

pub struct ImageFileCache {
    base_path: PathBuf,
    expiration: Duration,
    clean_on_index: bool,
    fetcher: Box<dyn EmoteFetcher>,
    state: Mutex<CacheState>,
}

impl ImageFileCache {
    pub fn new(
        base_path: PathBuf,
        expiration: Duration,
        clean_on_index: bool,
        ideal_frames: IdealFrames,
    ) -> Self {
        Self::with_fetcher(
            base_path,
            expiration,
            clean_on_index,
            Box::new(HttpFetcher::new(ideal_frames)),
        )
    }

    pub fn with_fetcher(
        base_path: PathBuf,
        expiration: Duration,
        clean_on_index: bool,
        fetcher: Box<dyn EmoteFetcher>,
    ) -> Self {
        Self {
            base_path,
            expiration,
            clean_on_index,
            fetcher,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cache file key of an emote render.
    pub fn file_key(emote: &Emote, size: ImageSize) -> String {
        format!(
            "{}_{}_{}",
            emote.provider_code(),
            emote.id(),
            size.bttv_label()
        )
    }

    /// Cache file key of one half of a wide emote render.
    pub fn half_key(emote: &Emote, size: ImageSize, half: Half) -> String {
        format!(
            "v{}_{}_{}_{}",
            half.letter(),
            emote.provider_code(),
            emote.id(),
            size.bttv_label()
        )
    }

    fn ratio_key(emote: &Emote) -> String {
        let mut hasher = Sha1::new();
        hasher.update(format!("{}_{}", emote.provider_code(), emote.id()).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Scan the cache directory and adopt existing PNG files. Files past
    /// the expiration are removed when `clean_on_index` is set, otherwise
    /// left on disk; either way they stay out of the index.
    pub async fn index(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.base_path)?;
        let mut state = self.state.lock().await;
        let mut indexed = 0usize;
        for dir_entry in std::fs::read_dir(&self.base_path)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = dir_entry.metadata()?.modified()?;
            if modified.elapsed().unwrap_or_default() > self.expiration {
                if self.clean_on_index {
                    remove_file_if_present(&path)?;
                }
                continue;
            }
            state.entries.insert(
                key.to_owned(),
                Entry {
                    path,
                    created: modified,
                },
            );
            indexed += 1;
        }
        tracing::info!(indexed, path = %self.base_path.display(), "Indexed image cache");
        Ok(())
    }

    /// Drop every entry past the expiration, deleting its file. Returns how
    /// many entries were removed.
    pub async fn evict(&self) -> Result<usize, CacheError> {
        let mut state = self.state.lock().await;
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.created.elapsed().unwrap_or_default() > self.expiration)
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = 0;
        for key in stale {
            if let Some(entry) = state.entries.remove(&key) {
                remove_file_if_present(&entry.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drop everything, deleting all cache files.
    pub async fn purge(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        for (_, entry) in state.entries.drain() {
            remove_file_if_present(&entry.path)?;
        }
        Ok(())
    }

    /// Run `evict` hourly until shutdown.
    pub async fn auto_evict(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Cache eviction loop stopped (shutdown)");
                    return;
                }
                _ = tokio::time::sleep(EVICTION_INTERVAL) => {}
            }
            match self.evict().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Evicted expired emote images"),
                Err(e) => tracing::warn!(error = %e, "Cache eviction failed"),
            }
        }
    }

    /// Return the processed PNG for an emote, building and caching it on a
    /// miss.
    pub async fn get_or_build(
        &self,
        emote: &Emote,
        size: ImageSize,
    ) -> Result<Vec<u8>, CacheError> {
        let mut state = self.state.lock().await;
        let key = Self::file_key(emote, size);
        if let Some(entry) = state.entries.get(&key) {
            return Ok(tokio::fs::read(&entry.path).await?);
        }
        let data = self.build(emote, size).await?;
        self.write_entry(&mut state, &key, &data).await?;
        Ok(data)
    }

    /// Return one half of a wide emote render, building and caching **both**
    /// halves on a miss.
    pub async fn get_or_build_half(
        &self,
        emote: &Emote,
        size: ImageSize,
        half: Half,
    ) -> Result<Vec<u8>, CacheError> {
        let mut state = self.state.lock().await;
        let key = Self::half_key(emote, size, half);
        if let Some(entry) = state.entries.get(&key) {
            return Ok(tokio::fs::read(&entry.path).await?);
        }
        let (left, right) = self.build_halves(emote, size).await?;
        self.write_entry(&mut state, &Self::half_key(emote, size, Half::Left), &left)
            .await?;
        self.write_entry(&mut state, &Self::half_key(emote, size, Half::Right), &right)
            .await?;
        Ok(match half {
            Half::Left => left,
            Half::Right => right,
        })
    }

    /// Warm the cache without handing the bytes to anyone.
    pub async fn prefetch(&self, emote: &Emote, size: ImageSize) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let key = Self::file_key(emote, size);
        if state.entries.contains_key(&key) {
            return Ok(());
        }
        let data = self.build(emote, size).await?;
        self.write_entry(&mut state, &key, &data).await
    }

    /// Warm both halves of a wide emote.
    pub async fn prefetch_halves(&self, emote: &Emote, size: ImageSize) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let left_key = Self::half_key(emote, size, Half::Left);
        let right_key = Self::half_key(emote, size, Half::Right);
        if state.entries.contains_key(&left_key) && state.entries.contains_key(&right_key) {
            return Ok(());
        }
        let (left, right) = self.build_halves(emote, size).await?;
        self.write_entry(&mut state, &left_key, &left).await?;
        self.write_entry(&mut state, &right_key, &right).await
    }

    /// Width/height ratio of the emote's source image, memoized. The probe
    /// reads only the image header at the small size.
    pub async fn aspect_ratio(&self, emote: &Emote) -> Result<f64, CacheError> {
        let mut state = self.state.lock().await;
        let key = Self::ratio_key(emote);
        if let Some(ratio) = state.aspect_ratios.get(&key) {
            return Ok(*ratio);
        }
        let (width, height) = self.fetcher.fetch_dimensions(emote).await?;
        let ratio = f64::from(width) / f64::from(height);
        state.aspect_ratios.insert(key, ratio);
        Ok(ratio)
    }

    async fn build(&self, emote: &Emote, size: ImageSize) -> Result<Vec<u8>, CacheError> {
        let img = self.fetcher.fetch_image(emote, size).await?;
        let square = image_pipeline::render_square(&img, size.pixels());
        Ok(image_pipeline::encode_png(&square)?)
    }

    async fn build_halves(
        &self,
        emote: &Emote,
        size: ImageSize,
    ) -> Result<(Vec<u8>, Vec<u8>), CacheError> {
        let img = self.fetcher.fetch_image(emote, size).await?;
        let (left, right) = image_pipeline::render_halves(&img, size.pixels());
        Ok((
            image_pipeline::encode_png(&left)?,
            image_pipeline::encode_png(&right)?,
        ))
    }

    async fn write_entry(
        &self,
        state: &mut CacheState,
        key: &str,
        data: &[u8],
    ) -> Result<(), CacheError> {
        let path = self.base_path.join(format!("{key}.png"));
        tokio::fs::write(&path, data).await?;
        state.entries.insert(
            key.to_owned(),
            Entry {
                path,
                created: SystemTime::now(),
            },
        );
        Ok(())
    }
}

fn remove_file_if_present(path: &std::path::Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
