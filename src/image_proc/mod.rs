//! Image processing module.
//!
//! Provides decoding, normalization and dispatch of uploaded images.

pub mod decode;
pub mod frame;
pub mod transform;

pub use decode::{decode_image, DecodeConfig, DecodeError};
pub use frame::NormalizedFrame;
pub use transform::normalize;

use crate::display::{DispatchError, DisplayController, PanelSettings};
use crate::options::OptionsRegistry;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Image processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Image processor that handles the full pipeline
pub struct ImageProcessor {
    options: Arc<OptionsRegistry>,
    display: DisplayController,
    decode_config: DecodeConfig,
}

impl ImageProcessor {
    /// Create a new image processor
    pub fn new(
        options: Arc<OptionsRegistry>,
        display: DisplayController,
        decode_config: DecodeConfig,
    ) -> Self {
        Self {
            options,
            display,
            decode_config,
        }
    }

    /// Shared options registry
    pub fn options(&self) -> Arc<OptionsRegistry> {
        Arc::clone(&self.options)
    }

    /// Decode an uploaded image and show it.
    ///
    /// Full pipeline:
    /// 1. Decode the container
    /// 2. Read the panel geometry from the current options
    /// 3. Resample and convert to RGB
    /// 4. Send to display
    ///
    /// Nothing reaches the driver unless the payload decodes. Decoding and
    /// resampling run on the blocking pool so the listeners stay responsive.
    pub async fn process(&self, payload: Bytes) -> Result<(), ProcessingError> {
        tracing::debug!("Processing {} byte payload", payload.len());

        let decode_config = self.decode_config.clone();
        let img =
            tokio::task::spawn_blocking(move || decode_image(&payload, &decode_config)).await??;

        let (revision, options) = self.options.snapshot().await;
        let settings = PanelSettings::from_options(&options).map_err(DispatchError::from)?;
        let (width, height) = settings.dimensions();

        let frame = tokio::task::spawn_blocking(move || normalize(img, width, height)).await?;

        self.display.dispatch(frame, revision, settings).await?;

        tracing::info!("Image displayed ({}x{})", width, height);
        Ok(())
    }

    /// Show test pattern on display
    pub async fn show_test_pattern(&self) -> Result<(), ProcessingError> {
        self.display.test_pattern().await?;
        Ok(())
    }

    /// Clear display
    pub async fn clear_display(&self) -> Result<(), ProcessingError> {
        self.display.clear().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::display::recording::{Recorder, RecordingPanel};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Processor on a recording 64x64 panel with default options
    pub fn recording_processor() -> (Arc<ImageProcessor>, Recorder) {
        let (panel, recorder) = RecordingPanel::new(64, 64);
        let processor = ImageProcessor::new(
            Arc::new(OptionsRegistry::default()),
            DisplayController::new(Box::new(panel)),
            DecodeConfig::default(),
        );
        (Arc::new(processor), recorder)
    }

    /// Solid-colour PNG
    pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }
}
