//! Runtime options registry for the LED panel driver.
//!
//! Mirrors the tunables of the rpi-rgb-led-matrix driver as a name -> value
//! map that can be read and rewritten while the server is running. Values are
//! stored exactly as supplied; they are only interpreted when the display
//! controller hands them to the driver (see `display::PanelSettings`).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;

/// Prefix of options that exist for the driver but are not exposed.
pub const RESERVED_PREFIX: char = '_';

/// A single option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    /// Interpret the value as an unsigned integer.
    ///
    /// Strings are accepted when they parse, since values written over HTTP
    /// always arrive as text.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            OptionValue::Int(v) => u32::try_from(*v).ok(),
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Bool(_) => None,
        }
    }

    /// Interpret the value as a boolean ("true"/"false"/"1"/"0" for strings)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Int(0) => Some(false),
            OptionValue::Int(1) => Some(true),
            OptionValue::Int(_) => None,
            OptionValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
        }
    }

    /// Interpret the value as text
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

/// Driver defaults for a single 64x64 panel on an Adafruit HAT with the PWM mod
static DEFAULT_OPTIONS: Lazy<Vec<(&'static str, OptionValue)>> = Lazy::new(|| {
    vec![
        ("brightness", OptionValue::Int(50)),
        ("rows", OptionValue::Int(64)),
        ("cols", OptionValue::Int(64)),
        ("chain_length", OptionValue::Int(1)),
        ("parallel", OptionValue::Int(1)),
        ("gpio_slowdown", OptionValue::Int(1)),
        ("pwm_bits", OptionValue::Int(11)),
        ("pwm_dither_bits", OptionValue::Int(1)),
        ("pwm_lsb_nanoseconds", OptionValue::Int(90)),
        ("hardware_mapping", OptionValue::from("adafruit-hat-pwm")),
        ("scan_mode", OptionValue::Int(0)),
        ("multiplexing", OptionValue::Int(0)),
        ("row_address_type", OptionValue::Int(0)),
        ("limit_refresh_rate_hz", OptionValue::Int(0)),
        ("disable_hardware_pulsing", OptionValue::Bool(false)),
        ("show_refresh_rate", OptionValue::Bool(false)),
        ("inverse_colors", OptionValue::Bool(false)),
        ("led_rgb_sequence", OptionValue::from("RGB")),
        ("pixel_mapper_config", OptionValue::from("")),
        ("panel_type", OptionValue::from("")),
        // Process-level flags, only honoured when the driver starts
        ("_daemon", OptionValue::Bool(false)),
        ("_drop_privileges", OptionValue::Bool(true)),
    ]
});

/// Options registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Option not found: {0}")]
    NotFound(String),

    #[error("No value provided")]
    MissingValue,
}

/// Full option table, including reserved entries
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    values: BTreeMap<String, OptionValue>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            values: DEFAULT_OPTIONS
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }
}

impl DisplayOptions {
    /// Whether `name` is a reserved option hidden from callers
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with(RESERVED_PREFIX)
    }

    /// Look up any option, reserved ones included
    pub fn value(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Public options only
    pub fn public(&self) -> BTreeMap<String, OptionValue> {
        self.values
            .iter()
            .filter(|(name, _)| !Self::is_reserved(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn get_public(&self, name: &str) -> Option<&OptionValue> {
        if Self::is_reserved(name) {
            return None;
        }
        self.values.get(name)
    }

    /// Overwrite a public option, used when seeding from the startup config
    pub fn set_value(&mut self, name: &str, value: OptionValue) -> Result<(), OptionsError> {
        if Self::is_reserved(name) {
            return Err(OptionsError::UnknownOption(name.to_string()));
        }
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(OptionsError::UnknownOption(name.to_string())),
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    options: DisplayOptions,
    revision: u64,
}

/// Shared, mutable option registry
#[derive(Debug)]
pub struct OptionsRegistry {
    state: RwLock<RegistryState>,
}

impl Default for OptionsRegistry {
    fn default() -> Self {
        Self::new(DisplayOptions::default())
    }
}

impl OptionsRegistry {
    /// Create a registry seeded with `options`
    pub fn new(options: DisplayOptions) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                options,
                revision: 0,
            }),
        }
    }

    /// Overwrite an option in place.
    ///
    /// The option name is checked before the value, so an unknown name wins
    /// over a missing value.
    pub async fn set(&self, name: &str, value: Option<OptionValue>) -> Result<(), OptionsError> {
        let mut state = self.state.write().await;

        if state.options.get_public(name).is_none() {
            return Err(OptionsError::UnknownOption(name.to_string()));
        }
        let value = value.ok_or(OptionsError::MissingValue)?;

        tracing::info!("Option {} set to {}", name, value);
        state.options.set_value(name, value)?;
        state.revision += 1;
        Ok(())
    }

    /// Current value of a public option
    pub async fn get(&self, name: &str) -> Result<OptionValue, OptionsError> {
        let state = self.state.read().await;
        state
            .options
            .get_public(name)
            .cloned()
            .ok_or_else(|| OptionsError::NotFound(name.to_string()))
    }

    /// All public options
    pub async fn list(&self) -> BTreeMap<String, OptionValue> {
        self.state.read().await.options.public()
    }

    /// Copy of the full table together with its revision
    pub async fn snapshot(&self) -> (u64, DisplayOptions) {
        let state = self.state.read().await;
        (state.revision, state.options.clone())
    }
}
