use std::path::{Path, PathBuf};

use meander_stream::{StreamConfig, StreamError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Values given on the command line, applied over the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverrides {
    pub radius: Option<u32>,
    pub tick_rate: Option<f64>,
    pub seed: Option<u32>,
}

/// Engine settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Simulation ticks per second.
    pub tick_rate: f64,
    /// Frames per second when the display does not report a refresh rate.
    pub fallback_frame_rate: f64,
    pub stream: StreamConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            fallback_frame_rate: 60.0,
            stream: StreamConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults, then apply
    /// command-line overrides and validate the result.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(radius) = overrides.radius {
            config.stream.radius = radius;
        }
        if let Some(tick_rate) = overrides.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(seed) = overrides.seed {
            config.stream.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rate) in [
            ("tick_rate", self.tick_rate),
            ("fallback_frame_rate", self.fallback_frame_rate),
        ] {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number of Hz, got {rate}"
                )));
            }
        }
        self.stream.validate().map_err(|err| match err {
            StreamError::InvalidConfig(message) => ConfigError::Invalid(message),
            other => ConfigError::Invalid(other.to_string()),
        })
    }

    /// Frame rate to pace presentation at, given the display's reported rate.
    pub fn frame_rate(&self, display_refresh: Option<f64>) -> f64 {
        display_refresh
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .unwrap_or(self.fallback_frame_rate)
    }
}
