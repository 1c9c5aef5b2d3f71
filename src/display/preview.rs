//! Preview sink used in debug mode.
//!
//! Writes every frame to a PNG file instead of driving LEDs, so the whole
//! pipeline can run on a machine without a panel attached.

use super::{DriverError, PanelDriver, PanelSettings};
use crate::image_proc::NormalizedFrame;
use image::ImageFormat;
use std::path::PathBuf;

/// Panel stand-in that renders to a PNG file
pub struct PreviewPanel {
    path: PathBuf,
    dimensions: (u32, u32),
    frames_shown: u64,
}

impl PreviewPanel {
    pub fn new(path: PathBuf, settings: &PanelSettings) -> Self {
        Self {
            path,
            dimensions: settings.dimensions(),
            frames_shown: 0,
        }
    }

    #[cfg(test)]
    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl PanelDriver for PreviewPanel {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn configure(&mut self, settings: &PanelSettings) -> Result<(), DriverError> {
        let dimensions = settings.dimensions();
        if dimensions != self.dimensions {
            tracing::info!(
                "Preview canvas resized {}x{} -> {}x{}",
                self.dimensions.0,
                self.dimensions.1,
                dimensions.0,
                dimensions.1
            );
        }
        self.dimensions = dimensions;
        Ok(())
    }

    fn submit_frame(&mut self, frame: NormalizedFrame) -> Result<(), DriverError> {
        let (width, height) = frame.dimensions();

        // Write next to the target and rename so viewers never see half a file
        let tmp_path = self.path.with_extension("png.tmp");
        frame
            .into_rgb()
            .save_with_format(&tmp_path, ImageFormat::Png)?;
        std::fs::rename(&tmp_path, &self.path).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp_path);
        })?;

        self.frames_shown += 1;
        tracing::info!(
            "Preview frame #{} ({}x{}) written to {}",
            self.frames_shown,
            width,
            height,
            self.path.display()
        );
        Ok(())
    }
}
