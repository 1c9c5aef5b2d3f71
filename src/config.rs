//! Startup configuration for the LED matrix server.
//!
//! Handles loading and validating configuration from a JSON file, plus the
//! `DEBUG` environment switch. Everything here is resolved once before the
//! components are built and never changes afterwards; runtime-tunable panel
//! settings live in the options registry instead.

use crate::image_proc::DecodeConfig;
use crate::options::{DisplayOptions, OptionValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/led-matrix-server/config.json";

/// Default port for both protocols
pub const DEFAULT_PORT: u16 = 14366;

/// Environment variable selecting preview mode
pub const DEBUG_ENV: &str = "DEBUG";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Which network protocol(s) to accept images on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Length-prefixed binary frames over raw TCP
    Socket,
    /// Multipart uploads plus the options API over HTTP
    Http,
    /// Both, on separate ports
    Both,
}

impl Transport {
    pub fn uses_socket(self) -> bool {
        matches!(self, Transport::Socket | Transport::Both)
    }

    pub fn uses_http(self) -> bool {
        matches!(self, Transport::Http | Transport::Both)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Preview frames instead of driving the panel
    #[serde(default)]
    pub debug: bool,

    /// Enabled transport(s)
    #[serde(default = "default_transport")]
    pub transport: Transport,

    /// Address both listeners bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Binary socket protocol port
    #[serde(default = "default_port")]
    pub socket_port: u16,

    /// HTTP port
    #[serde(default = "default_port")]
    pub http_port: u16,

    /// Largest accepted binary frame payload in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u64,

    /// Largest accepted source image width/height
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    /// Where preview mode writes the last frame
    #[serde(default = "default_preview_path")]
    pub preview_path: PathBuf,

    /// Panel option overrides applied on top of the driver defaults
    #[serde(default)]
    pub panel: BTreeMap<String, OptionValue>,
}

fn default_transport() -> Transport {
    Transport::Socket
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_frame_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_max_image_dimension() -> u32 {
    8192
}

fn default_preview_path() -> PathBuf {
    PathBuf::from("/tmp/led-matrix-preview.png")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            transport: default_transport(),
            bind_address: default_bind_address(),
            socket_port: default_port(),
            http_port: default_port(),
            max_frame_bytes: default_max_frame_bytes(),
            max_image_dimension: default_max_image_dimension(),
            preview_path: default_preview_path(),
            panel: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults only when the file does
    /// not exist. Unreadable, malformed or invalid files are errors.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Config file {} not found, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply `DEBUG` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// `DEBUG=true` selects preview mode; any other value selects the panel.
    /// When the variable is unset the file setting stands.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(DEBUG_ENV) {
            self.debug = value == "true";
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.uses_socket() && self.socket_port == 0 {
            return Err(ConfigError::ValidationError(
                "socket_port must be greater than 0".to_string(),
            ));
        }

        if self.transport.uses_http() && self.http_port == 0 {
            return Err(ConfigError::ValidationError(
                "http_port must be greater than 0".to_string(),
            ));
        }

        if self.transport == Transport::Both && self.socket_port == self.http_port {
            return Err(ConfigError::ValidationError(format!(
                "socket_port and http_port must differ when both transports are enabled (both are {})",
                self.socket_port
            )));
        }

        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_frame_bytes must be greater than 0".to_string(),
            ));
        }

        if self.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "max_image_dimension must be greater than 0".to_string(),
            ));
        }

        self.display_options()?;

        Ok(())
    }

    /// Initial panel options: driver defaults with the `panel` overrides applied
    pub fn display_options(&self) -> Result<DisplayOptions, ConfigError> {
        let mut options = DisplayOptions::default();
        for (name, value) in &self.panel {
            options.set_value(name, value.clone()).map_err(|e| {
                ConfigError::ValidationError(format!("panel.{}: {}", name, e))
            })?;
        }
        Ok(options)
    }

    /// Decoder limits derived from this configuration
    pub fn decode_config(&self) -> DecodeConfig {
        DecodeConfig {
            max_width: self.max_image_dimension,
            max_height: self.max_image_dimension,
        }
    }
}
