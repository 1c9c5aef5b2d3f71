//! Image normalization for the panel.
//!
//! Resamples to the exact panel geometry and reduces the colour model to
//! plain RGB8, which is the only layout the matrix driver accepts.

use super::frame::NormalizedFrame;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

/// Resample `img` to `width` x `height` and convert it to RGB.
///
/// The panel geometry wins over the source aspect ratio: the whole source is
/// stretched onto the whole panel, nothing is cropped or letterboxed.
/// Transparent pixels end up black, which is what an unlit LED looks like.
pub fn normalize(img: DynamicImage, width: u32, height: u32) -> NormalizedFrame {
    let (src_width, src_height) = img.dimensions();

    let resized = if (src_width, src_height) == (width, height) {
        img
    } else {
        tracing::debug!(
            "Scaling {}x{} -> {}x{}",
            src_width,
            src_height,
            width,
            height
        );
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let rgb = if resized.color().has_alpha() {
        flatten_alpha(&resized)
    } else {
        resized.into_rgb8()
    };

    NormalizedFrame::from_rgb(rgb)
}

/// Composite an image with alpha onto black
fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        Rgb([scale(r), scale(g), scale(b)])
    })
}
