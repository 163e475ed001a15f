//! Emote image processing: still-frame synthesis for GIFs and the
//! aspect-preserving square renders Twitch clients expect.

mod frames;
mod resize;

pub use frames::{decode_still, IdealFrames};
pub use resize::{encode_png, render_halves, render_square};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported emote type {0:?}")]
    UnsupportedType(String),
    #[error("animation has no frames")]
    EmptyAnimation,
}
