//! Bridge configuration (kiln.toml)
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! namespace = "kiln"
//!
//! [json]
//! pretty = false
//! max_depth = 200
//!
//! [intel]
//! data_path = "intel.json"
//!
//! [audio]
//! sample_rate = 48000
//! devices = [{ name = "Speakers", channels = 2 }]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::convert::DEFAULT_MAX_DEPTH;

/// Errors that can occur while loading configuration or datasets
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to parse an intel dataset
    #[error("Failed to parse intel dataset: {0}")]
    DatasetError(#[from] serde_json::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Global the bindings are installed under
    pub namespace: String,

    /// `json` namespace settings
    pub json: JsonConfig,

    /// Address intelligence dataset
    pub intel: IntelConfig,

    /// Simulated audio host
    pub audio: AudioConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: "kiln".to_string(),
            json: JsonConfig::default(),
            intel: IntelConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

/// `[json]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JsonConfig {
    /// Pretty-print when `json.encode` gets no explicit flag
    pub pretty: bool,

    /// Table nesting limit for `json.encode`
    pub max_depth: usize,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// `[intel]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntelConfig {
    /// JSON dataset loaded at startup; lookups miss when unset
    pub data_path: Option<PathBuf>,
}

/// `[audio]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Mixer sample rate in Hz
    pub sample_rate: u32,

    /// Output devices, the first one being the default
    pub devices: Vec<DeviceConfig>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            devices: vec![DeviceConfig {
                name: "Default Output".to_string(),
                channels: 2,
            }],
        }
    }
}

/// Output device entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device name
    pub name: String,

    /// Output channel count
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_channels() -> u16 {
    2
}

impl BridgeConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace cannot be empty".to_string(),
            ));
        }
        if self.namespace.contains('.') {
            return Err(ConfigError::ValidationError(format!(
                "namespace '{}' must be a single identifier",
                self.namespace
            )));
        }

        if self.json.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "json.max_depth must be at least 1".to_string(),
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(ConfigError::ValidationError(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        for device in &self.audio.devices {
            if device.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "audio device name cannot be empty".to_string(),
                ));
            }
            if device.channels == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "audio device '{}' has no channels",
                    device.name
                )));
            }
        }

        Ok(())
    }
}
