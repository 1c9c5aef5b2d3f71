//! Display module for LED panel output.
//!
//! Frames reach the panel through the [`PanelDriver`] capability: either the
//! real HUB75 matrix (`hardware` feature) or a preview sink that writes PNG
//! files. [`DisplayController`] owns the single driver instance and
//! serialises access to it.

#[cfg(feature = "hardware")]
pub mod matrix;
pub mod preview;
#[cfg(test)]
pub mod recording;
pub mod settings;

pub use preview::PreviewPanel;
pub use settings::PanelSettings;

use crate::config::Config;
use crate::image_proc::NormalizedFrame;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Panel driver errors
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Option {name} = {value:?} is invalid, expected {expected}")]
    InvalidOption {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("Option {0} is missing")]
    MissingOption(String),

    #[cfg(feature = "hardware")]
    #[error("Panel initialization failed: {0}")]
    Init(String),

    #[cfg(not(feature = "hardware"))]
    #[error("Panel unavailable: {0}")]
    Unsupported(&'static str),

    #[cfg(feature = "hardware")]
    #[error("Panel thread is gone")]
    Disconnected,

    #[error("Preview write failed: {0}")]
    Preview(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Frame is {actual:?} but the panel is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Panel lock poisoned by an earlier failure")]
    Poisoned,

    #[error("Dispatch task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Capability interface of a panel driver
pub trait PanelDriver: Send {
    /// Canvas size in pixels (width, height)
    fn dimensions(&self) -> (u32, u32);

    /// Apply changed settings
    fn configure(&mut self, settings: &PanelSettings) -> Result<(), DriverError>;

    /// Replace the whole panel content with `frame`
    fn submit_frame(&mut self, frame: NormalizedFrame) -> Result<(), DriverError>;
}

/// Open the driver selected by the startup configuration
pub fn open_driver(
    config: &Config,
    settings: &PanelSettings,
) -> Result<Box<dyn PanelDriver>, DriverError> {
    if config.debug {
        tracing::info!(
            "Debug mode: previewing frames to {}",
            config.preview_path.display()
        );
        return Ok(Box::new(PreviewPanel::new(
            config.preview_path.clone(),
            settings,
        )));
    }

    open_hardware(settings)
}

#[cfg(feature = "hardware")]
fn open_hardware(settings: &PanelSettings) -> Result<Box<dyn PanelDriver>, DriverError> {
    Ok(Box::new(matrix::MatrixPanel::start(settings)?))
}

#[cfg(not(feature = "hardware"))]
fn open_hardware(_settings: &PanelSettings) -> Result<Box<dyn PanelDriver>, DriverError> {
    Err(DriverError::Unsupported(
        "built without the `hardware` feature, set DEBUG=true to preview",
    ))
}

struct DriverSlot {
    driver: Box<dyn PanelDriver>,
    applied_revision: Option<u64>,
}

impl DriverSlot {
    fn apply(&mut self, revision: u64, settings: &PanelSettings) -> Result<(), DriverError> {
        // A request holding an older snapshot must not roll settings back
        if self.applied_revision.is_some_and(|applied| applied >= revision) {
            return Ok(());
        }
        self.driver.configure(settings)?;
        self.applied_revision = Some(revision);
        tracing::debug!("Panel settings at revision {} applied", revision);
        Ok(())
    }

    fn submit(&mut self, frame: NormalizedFrame) -> Result<(), DispatchError> {
        let expected = self.driver.dimensions();
        let actual = frame.dimensions();
        if expected != actual {
            return Err(DispatchError::DimensionMismatch { expected, actual });
        }
        self.driver.submit_frame(frame)?;
        Ok(())
    }
}

/// Thread-safe display controller wrapper
#[derive(Clone)]
pub struct DisplayController {
    slot: Arc<Mutex<DriverSlot>>,
}

impl DisplayController {
    /// Wrap an opened driver.
    ///
    /// The driver is assumed to already run with the registry's initial
    /// settings (revision 0).
    pub fn new(driver: Box<dyn PanelDriver>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(DriverSlot {
                driver,
                applied_revision: Some(0),
            })),
        }
    }

    /// Show a frame, first applying `settings` if the registry moved on
    /// since the last dispatch
    pub async fn dispatch(
        &self,
        frame: NormalizedFrame,
        revision: u64,
        settings: PanelSettings,
    ) -> Result<(), DispatchError> {
        self.with_slot(move |slot| {
            slot.apply(revision, &settings)?;
            slot.submit(frame)
        })
        .await
    }

    /// Show the colour bar test pattern
    pub async fn test_pattern(&self) -> Result<(), DispatchError> {
        self.with_slot(|slot| {
            let (width, height) = slot.driver.dimensions();
            slot.submit(NormalizedFrame::test_pattern(width, height))
        })
        .await
    }

    /// Turn every LED off
    pub async fn clear(&self) -> Result<(), DispatchError> {
        self.with_slot(|slot| {
            let (width, height) = slot.driver.dimensions();
            slot.submit(NormalizedFrame::blank(width, height))
        })
        .await
    }

    /// Current driver canvas size
    pub async fn dimensions(&self) -> Result<(u32, u32), DispatchError> {
        self.with_slot(|slot| Ok(slot.driver.dimensions())).await
    }

    /// Run `f` with exclusive driver access on the blocking pool
    async fn with_slot<F, T>(&self, f: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut DriverSlot) -> Result<T, DispatchError> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().map_err(|_| DispatchError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingPanel;
    use super::*;
    use crate::options::{DisplayOptions, OptionValue};

    fn settings_with(name: &str, value: OptionValue) -> PanelSettings {
        let mut options = DisplayOptions::default();
        options.set_value(name, value).unwrap();
        PanelSettings::from_options(&options).unwrap()
    }

    #[tokio::test]
    async fn dispatch_hands_frame_to_driver() {
        let (panel, recorder) = RecordingPanel::new(64, 64);
        let controller = DisplayController::new(Box::new(panel));
        let settings = PanelSettings::from_options(&DisplayOptions::default()).unwrap();

        controller
            .dispatch(NormalizedFrame::solid(64, 64, [9, 8, 7]), 0, settings)
            .await
            .unwrap();

        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pixel(0, 0), [9, 8, 7]);
        // Revision 0 is what the driver was opened with
        assert_eq!(recorder.configure_count(), 0);
    }

    #[tokio::test]
    async fn wrong_sized_frame_is_rejected() {
        let (panel, recorder) = RecordingPanel::fixed(64, 64);
        let controller = DisplayController::new(Box::new(panel));
        let settings = PanelSettings::from_options(&DisplayOptions::default()).unwrap();

        let result = controller
            .dispatch(NormalizedFrame::blank(32, 64), 0, settings)
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::DimensionMismatch {
                expected: (64, 64),
                actual: (32, 64)
            })
        ));
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test]
    async fn settings_are_applied_once_per_revision() {
        let (panel, recorder) = RecordingPanel::new(64, 64);
        let controller = DisplayController::new(Box::new(panel));
        let dim = settings_with("brightness", OptionValue::Int(20));

        for _ in 0..2 {
            controller
                .dispatch(NormalizedFrame::blank(64, 64), 1, dim.clone())
                .await
                .unwrap();
        }
        assert_eq!(recorder.configure_count(), 1);

        // An older snapshot does not roll the panel back
        let stale = PanelSettings::from_options(&DisplayOptions::default()).unwrap();
        controller
            .dispatch(NormalizedFrame::blank(64, 64), 0, stale)
            .await
            .unwrap();
        assert_eq!(recorder.configure_count(), 1);
        assert_eq!(recorder.last_settings().unwrap().brightness, 20);
    }

    #[tokio::test]
    async fn driver_follows_new_geometry() {
        let (panel, recorder) = RecordingPanel::new(64, 64);
        let controller = DisplayController::new(Box::new(panel));
        let wide = settings_with("chain_length", OptionValue::Int(2));

        controller
            .dispatch(NormalizedFrame::blank(128, 64), 1, wide)
            .await
            .unwrap();

        assert_eq!(controller.dimensions().await.unwrap(), (128, 64));
        assert_eq!(recorder.frames()[0].dimensions(), (128, 64));
    }

    #[tokio::test]
    async fn test_pattern_and_clear_fill_the_panel() {
        let (panel, recorder) = RecordingPanel::new(32, 16);
        let controller = DisplayController::new(Box::new(panel));

        controller.test_pattern().await.unwrap();
        controller.clear().await.unwrap();

        let frames = recorder.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], NormalizedFrame::test_pattern(32, 16));
        assert_eq!(frames[1], NormalizedFrame::blank(32, 16));
    }

    #[tokio::test]
    async fn each_dispatch_owns_its_buffer() {
        let (panel, recorder) = RecordingPanel::new(64, 64);
        let controller = DisplayController::new(Box::new(panel));
        let settings = PanelSettings::from_options(&DisplayOptions::default()).unwrap();
        let frame = NormalizedFrame::solid(64, 64, [1, 2, 3]);

        controller
            .dispatch(frame.clone(), 0, settings.clone())
            .await
            .unwrap();
        controller.dispatch(frame, 0, settings).await.unwrap();

        let frames = recorder.frames();
        assert_eq!(frames[0], frames[1]);
        let addresses = recorder.buffer_addresses();
        assert_eq!(addresses.len(), 2);
        assert_ne!(addresses[0], addresses[1]);
    }

    #[tokio::test]
    async fn debug_mode_previews_uploads_at_panel_size() {
        use crate::image_proc::test_support::png;
        use crate::image_proc::{DecodeConfig, ImageProcessor};
        use crate::options::OptionsRegistry;

        let path = std::env::temp_dir().join(format!(
            "led-matrix-open-driver-test-{}.png",
            std::process::id()
        ));
        let config = Config {
            debug: true,
            preview_path: path.clone(),
            ..Config::default()
        };
        let settings = PanelSettings::from_options(&DisplayOptions::default()).unwrap();

        let driver = open_driver(&config, &settings).unwrap();
        let processor = ImageProcessor::new(
            Arc::new(OptionsRegistry::default()),
            DisplayController::new(driver),
            DecodeConfig::default(),
        );
        processor
            .process(png(128, 128, [0, 0, 255]).into())
            .await
            .unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        let _ = std::fs::remove_file(&path);

        assert_eq!(written.dimensions(), (64, 64));
        assert_eq!(written.get_pixel(32, 32).0, [0, 0, 255]);
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn panel_mode_needs_hardware_support() {
        let config = Config {
            debug: false,
            ..Config::default()
        };
        let settings = PanelSettings::from_options(&DisplayOptions::default()).unwrap();

        assert!(matches!(
            open_driver(&config, &settings),
            Err(DriverError::Unsupported(_))
        ));
    }
}
