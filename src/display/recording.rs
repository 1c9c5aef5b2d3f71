//! Panel double that records everything it is asked to show.

use super::{DriverError, PanelDriver, PanelSettings};
use crate::image_proc::NormalizedFrame;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Log {
    frames: Vec<NormalizedFrame>,
    addresses: Vec<usize>,
    settings: Vec<PanelSettings>,
}

/// Test panel driver
pub struct RecordingPanel {
    dimensions: (u32, u32),
    follow_settings: bool,
    log: Arc<Mutex<Log>>,
}

/// Read side of a [`RecordingPanel`]
#[derive(Clone)]
pub struct Recorder {
    log: Arc<Mutex<Log>>,
}

impl RecordingPanel {
    /// Panel that resizes itself when reconfigured, like the preview sink
    pub fn new(width: u32, height: u32) -> (Self, Recorder) {
        Self::build(width, height, true)
    }

    /// Panel whose geometry is fixed at startup, like real hardware
    pub fn fixed(width: u32, height: u32) -> (Self, Recorder) {
        Self::build(width, height, false)
    }

    fn build(width: u32, height: u32, follow_settings: bool) -> (Self, Recorder) {
        let log = Arc::new(Mutex::new(Log::default()));
        let panel = Self {
            dimensions: (width, height),
            follow_settings,
            log: Arc::clone(&log),
        };
        (panel, Recorder { log })
    }
}

impl PanelDriver for RecordingPanel {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn configure(&mut self, settings: &PanelSettings) -> Result<(), DriverError> {
        if self.follow_settings {
            self.dimensions = settings.dimensions();
        }
        self.log.lock().unwrap().settings.push(settings.clone());
        Ok(())
    }

    fn submit_frame(&mut self, frame: NormalizedFrame) -> Result<(), DriverError> {
        let mut log = self.log.lock().unwrap();
        log.addresses.push(frame.as_raw().as_ptr() as usize);
        log.frames.push(frame);
        Ok(())
    }
}

impl Recorder {
    pub fn frames(&self) -> Vec<NormalizedFrame> {
        self.log.lock().unwrap().frames.clone()
    }

    /// Address of each submitted pixel buffer, in submission order
    pub fn buffer_addresses(&self) -> Vec<usize> {
        self.log.lock().unwrap().addresses.clone()
    }

    pub fn configure_count(&self) -> usize {
        self.log.lock().unwrap().settings.len()
    }

    pub fn last_settings(&self) -> Option<PanelSettings> {
        self.log.lock().unwrap().settings.last().cloned()
    }
}
