//! Image decoding.
//!
//! Turns an uploaded byte blob into a pixel grid. The container format is
//! sniffed from the data itself; whatever the client claims is ignored.

use image::{DynamicImage, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;

/// Decode errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty image payload")]
    Empty,

    #[error("Unrecognized image format")]
    UnknownFormat,

    #[error("Image decode failed: {0}")]
    Invalid(#[from] image::ImageError),
}

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Maximum accepted source dimensions
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_width: 8192,
            max_height: 8192,
        }
    }
}

/// Decode an encoded image (PNG, JPEG, GIF, WebP, BMP)
pub fn decode_image(data: &[u8], config: &DecodeConfig) -> Result<DynamicImage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| DecodeError::Invalid(image::ImageError::IoError(e)))?;

    if reader.format().is_none() {
        return Err(DecodeError::UnknownFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_width);
    limits.max_image_height = Some(config.max_height);
    reader.limits(limits);

    let img = reader.decode()?;

    tracing::debug!(
        "Image decoded: {}x{} {:?}",
        img.width(),
        img.height(),
        img.color()
    );

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_supported_containers() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([10, 200, 30])));

        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
            let decoded = decode_image(&encode(&img, format), &DecodeConfig::default())
                .unwrap_or_else(|e| panic!("{:?} failed: {}", format, e));
            assert_eq!((decoded.width(), decoded.height()), (20, 10));
        }

        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([10, 200, 30, 255])));

        for format in [ImageFormat::Gif, ImageFormat::WebP] {
            let decoded = decode_image(&encode(&img, format), &DecodeConfig::default())
                .unwrap_or_else(|e| panic!("{:?} failed: {}", format, e));
            assert_eq!((decoded.width(), decoded.height()), (20, 10));
        }
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            decode_image(&[], &DecodeConfig::default()),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn rejects_garbage() {
        let garbage = [0x13u8; 16];
        assert!(matches!(
            decode_image(&garbage, &DecodeConfig::default()),
            Err(DecodeError::UnknownFormat)
        ));
    }

    #[test]
    fn rejects_truncated_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(32, 32));
        let png = encode(&img, ImageFormat::Png);

        assert!(matches!(
            decode_image(&png[..png.len() / 2], &DecodeConfig::default()),
            Err(DecodeError::Invalid(_))
        ));
    }

    #[test]
    fn enforces_dimension_limits() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 8));
        let png = encode(&img, ImageFormat::Png);
        let config = DecodeConfig {
            max_width: 32,
            max_height: 32,
        };

        assert!(matches!(
            decode_image(&png, &config),
            Err(DecodeError::Invalid(_))
        ));
    }
}
