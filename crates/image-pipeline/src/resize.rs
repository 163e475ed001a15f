use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::PipelineError;

/// Render an emote as a `px`-square image, padding the shorter axis with
/// transparency so the source keeps its aspect ratio.
pub fn render_square(img: &DynamicImage, px: u32) -> DynamicImage {
    fit_to_canvas(img, px, px)
}

/// Render a wide emote as two adjacent `px`-square halves.
pub fn render_halves(img: &DynamicImage, px: u32) -> (DynamicImage, DynamicImage) {
    let wide = fit_to_canvas(img, px * 2, px);
    let left = wide.crop_imm(0, 0, px, px);
    let right = wide.crop_imm(px, 0, px, px);
    (left, right)
}

/// Center the image on a transparent canvas of the target aspect ratio,
/// then Lanczos-resample to the target dimensions.
fn fit_to_canvas(img: &DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let ratio = f64::from(width) / f64::from(height);
    let target_ratio = f64::from(target_w) / f64::from(target_h);

    if (ratio - target_ratio).abs() < f64::EPSILON {
        return img.resize_exact(target_w, target_h, FilterType::Lanczos3);
    }

    let (canvas_w, canvas_h) = if target_ratio > ratio {
        // target is wider: pad horizontally
        ((target_ratio * f64::from(height)).round() as u32, height)
    } else {
        // target is taller: pad vertically
        (width, (f64::from(width) / target_ratio).round() as u32)
    };

    let mut canvas = RgbaImage::new(canvas_w, canvas_h);
    let x = i64::from(canvas_w.saturating_sub(width) / 2);
    let y = i64::from(canvas_h.saturating_sub(height) / 2);
    imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
    DynamicImage::ImageRgba8(canvas).resize_exact(target_w, target_h, FilterType::Lanczos3)
}

/// Encode to PNG; every cached emote image is PNG regardless of source.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
