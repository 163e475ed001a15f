use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};

use crate::PipelineError;

/// Hand-picked still frames for animated emotes whose first frame renders
/// badly, keyed `"<provider code>:<emote id>"`.
#[derive(Debug, Default, Clone)]
pub struct IdealFrames {
    frames: HashMap<String, usize>,
}

impl IdealFrames {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read a directives file: one `code:id:frame` per line, `#` starts a
    /// comment, blanks ignored. Invalid lines are logged and skipped.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(Self::parse(&data))
    }

    pub fn parse(data: &str) -> Self {
        let mut frames = HashMap::new();
        for (n, raw) in data.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default();
            let line = line.trim_matches([' ', '\t', '\r']);
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(':').collect();
            let [code, id, frame] = parts.as_slice() else {
                tracing::warn!(line = n + 1, "Invalid ideal-gif directive");
                continue;
            };
            let Ok(frame) = frame.parse::<usize>() else {
                tracing::warn!(line = n + 1, value = *frame, "Invalid ideal-gif frame index");
                continue;
            };
            frames.insert(format!("{code}:{id}"), frame);
        }
        Self { frames }
    }

    /// The frame to freeze an animated emote at; defaults to the first.
    pub fn frame_for(&self, code: char, emote_id: &str) -> usize {
        self.frames
            .get(&format!("{code}:{emote_id}"))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Decode emote bytes into a single still image.
///
/// GIFs are frozen at `stop_frame`; the decoder composites each frame
/// against the logical screen, so the selected frame is what a player
/// would actually show. An out-of-range `stop_frame` falls back to the
/// first frame.
pub fn decode_still(
    bytes: &[u8],
    image_type: &str,
    stop_frame: usize,
) -> Result<DynamicImage, PipelineError> {
    match image_type {
        "png" => Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?),
        "gif" => decode_gif_frame(bytes, stop_frame),
        other => Err(PipelineError::UnsupportedType(other.to_owned())),
    }
}

fn decode_gif_frame(bytes: &[u8], stop_frame: usize) -> Result<DynamicImage, PipelineError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let mut frames = decoder.into_frames();
    let first = match frames.next() {
        Some(frame) => frame?,
        None => return Err(PipelineError::EmptyAnimation),
    };
    let first = first.into_buffer();
    if stop_frame == 0 {
        return Ok(DynamicImage::ImageRgba8(first));
    }
    for (index, frame) in frames.enumerate() {
        let frame = frame?;
        if index + 1 == stop_frame {
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
    }
    // requested frame past the end of the animation
    Ok(DynamicImage::ImageRgba8(first))
}
