use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use emote_store::{Emote, ImageSize};
use image::{DynamicImage, ImageReader};
use image_pipeline::IdealFrames;

const USER_AGENT: &str = "mobile-emotes-proxy/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Enough bytes to cover PNG, GIF, and WebP headers with room to spare.
const HEADER_PROBE_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download emote image: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Pipeline(#[from] image_pipeline::PipelineError),
    #[error("decode image header: {0}")]
    Header(#[from] image::ImageError),
    #[error("probe image format: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty response body for {0}")]
    EmptyBody(String),
}

/// Fetches emote artwork from the provider CDNs.
///
/// A trait so the cache's build paths can be exercised without the network.
#[async_trait]
pub trait EmoteFetcher: Send + Sync {
    /// Download and decode an emote as a single still image.
    async fn fetch_image(&self, emote: &Emote, size: ImageSize)
        -> Result<DynamicImage, FetchError>;

    /// Determine `(width, height)` of the small-size image, reading only
    /// header bytes.
    async fn fetch_dimensions(&self, emote: &Emote) -> Result<(u32, u32), FetchError>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
    ideal_frames: IdealFrames,
}

impl HttpFetcher {
    pub fn new(ideal_frames: IdealFrames) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            ideal_frames,
        }
    }
}

#[async_trait]
impl EmoteFetcher for HttpFetcher {
    async fn fetch_image(
        &self,
        emote: &Emote,
        size: ImageSize,
    ) -> Result<DynamicImage, FetchError> {
        let url = emote.url(size);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        let stop_frame = self
            .ideal_frames
            .frame_for(emote.provider_code(), &emote.id());
        Ok(image_pipeline::decode_still(
            &bytes,
            emote.image_type(),
            stop_frame,
        )?)
    }

    async fn fetch_dimensions(&self, emote: &Emote) -> Result<(u32, u32), FetchError> {
        let url = emote.url(ImageSize::Small);
        let mut resp = self.http.get(&url).send().await?.error_for_status()?;
        let mut head = Vec::with_capacity(HEADER_PROBE_BYTES);
        while head.len() < HEADER_PROBE_BYTES {
            match resp.chunk().await? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }
        if head.is_empty() {
            return Err(FetchError::EmptyBody(url));
        }
        let reader = ImageReader::new(Cursor::new(head)).with_guessed_format()?;
        Ok(reader.into_dimensions()?)
    }
}
