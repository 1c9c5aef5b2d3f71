//! Typed panel driver settings.
//!
//! The options registry stores raw values; this is where they are checked,
//! right before a driver consumes them.

use super::DriverError;
use crate::options::{DisplayOptions, OptionValue};

/// Largest canvas (width x height) a frame is resampled to
pub const MAX_CANVAS_PIXELS: u64 = 1 << 22;

/// Panel settings as the matrix driver understands them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSettings {
    pub brightness: u8,
    pub rows: u32,
    pub cols: u32,
    pub chain_length: u32,
    pub parallel: u32,
    pub gpio_slowdown: u32,
    pub pwm_bits: u8,
    pub pwm_dither_bits: u32,
    pub pwm_lsb_nanoseconds: u32,
    pub hardware_mapping: String,
    pub scan_mode: u32,
    pub multiplexing: u32,
    pub row_address_type: u32,
    pub limit_refresh_rate_hz: u32,
    pub disable_hardware_pulsing: bool,
    pub show_refresh_rate: bool,
    pub inverse_colors: bool,
    pub led_rgb_sequence: String,
    pub pixel_mapper_config: String,
    pub panel_type: String,
    pub daemon: bool,
    pub drop_privileges: bool,
}

impl PanelSettings {
    /// Parse settings out of the option table
    pub fn from_options(options: &DisplayOptions) -> Result<Self, DriverError> {
        let reader = Reader(options);

        let settings = Self {
            brightness: reader.ranged("brightness", 1, 100)? as u8,
            rows: reader.ranged("rows", 1, 1024)?,
            cols: reader.ranged("cols", 1, 1024)?,
            chain_length: reader.ranged("chain_length", 1, 64)?,
            parallel: reader.ranged("parallel", 1, 6)?,
            gpio_slowdown: reader.ranged("gpio_slowdown", 0, 5)?,
            pwm_bits: reader.ranged("pwm_bits", 1, 11)? as u8,
            pwm_dither_bits: reader.ranged("pwm_dither_bits", 0, 2)?,
            pwm_lsb_nanoseconds: reader.ranged("pwm_lsb_nanoseconds", 50, 3000)?,
            hardware_mapping: reader.text("hardware_mapping")?,
            scan_mode: reader.ranged("scan_mode", 0, 1)?,
            multiplexing: reader.unsigned("multiplexing")?,
            row_address_type: reader.ranged("row_address_type", 0, 5)?,
            limit_refresh_rate_hz: reader.unsigned("limit_refresh_rate_hz")?,
            disable_hardware_pulsing: reader.flag("disable_hardware_pulsing")?,
            show_refresh_rate: reader.flag("show_refresh_rate")?,
            inverse_colors: reader.flag("inverse_colors")?,
            led_rgb_sequence: reader.text("led_rgb_sequence")?,
            pixel_mapper_config: reader.text("pixel_mapper_config")?,
            panel_type: reader.text("panel_type")?,
            daemon: reader.flag("_daemon")?,
            drop_privileges: reader.flag("_drop_privileges")?,
        };

        if settings.led_rgb_sequence.len() != 3 {
            return Err(DriverError::InvalidOption {
                name: "led_rgb_sequence".to_string(),
                value: settings.led_rgb_sequence,
                expected: "a permutation of RGB",
            });
        }

        let (width, height) = settings.dimensions();
        if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
            return Err(DriverError::InvalidOption {
                name: "cols, chain_length, rows, parallel".to_string(),
                value: format!("{}x{}", width, height),
                expected: "a canvas of at most 4194304 pixels",
            });
        }

        Ok(settings)
    }

    /// Full canvas size: chained panels extend the width, parallel chains
    /// extend the height
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols * self.chain_length, self.rows * self.parallel)
    }
}

struct Reader<'a>(&'a DisplayOptions);

impl Reader<'_> {
    fn raw(&self, name: &str) -> Result<&OptionValue, DriverError> {
        self.0
            .value(name)
            .ok_or_else(|| DriverError::MissingOption(name.to_string()))
    }

    fn invalid(name: &str, value: &OptionValue, expected: &'static str) -> DriverError {
        DriverError::InvalidOption {
            name: name.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    fn unsigned(&self, name: &str) -> Result<u32, DriverError> {
        let value = self.raw(name)?;
        value
            .as_u32()
            .ok_or_else(|| Self::invalid(name, value, "an unsigned integer"))
    }

    fn ranged(&self, name: &str, min: u32, max: u32) -> Result<u32, DriverError> {
        let value = self.raw(name)?;
        match value.as_u32() {
            Some(v) if (min..=max).contains(&v) => Ok(v),
            _ => Err(Self::invalid(name, value, "an integer within the driver's range")),
        }
    }

    fn flag(&self, name: &str) -> Result<bool, DriverError> {
        let value = self.raw(name)?;
        value
            .as_bool()
            .ok_or_else(|| Self::invalid(name, value, "a boolean"))
    }

    fn text(&self, name: &str) -> Result<String, DriverError> {
        Ok(self.raw(name)?.as_text())
    }
}
