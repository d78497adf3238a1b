use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio_system::port::PortMode;
use crate::error::ConfigError;

/// Engine configuration.
///
/// Defaults describe the reference handheld target: eight hardware channels
/// with one kept for music, 8 KiB per output cycle at 48 kHz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of sound effect channels (and SFX worker threads)
    pub channel_count: usize,

    /// Size in bytes of each PCM buffer handed to a port
    pub buffer_size: usize,

    /// Fixed hardware output rate in Hz
    pub output_rate: u32,

    /// Sample count an SFX port is opened with before its first configure
    pub sfx_port_samples: usize,

    /// Hardware volume value that corresponds to 0 dB
    pub hardware_volume_max: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_count: 7,
            buffer_size: 8192,
            output_rate: 48_000,
            sfx_port_samples: 64,
            hardware_volume_max: 32_768,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the directory next to the executable.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path, writing defaults when missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;
            let config: EngineConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })?;
            config.validate()?;

            tracing::info!("Loaded engine config from: {}", path.display());
            Ok(config)
        } else {
            let config = EngineConfig::default();
            config.save_to(path)?;
            tracing::info!("Created default engine config at: {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    /// Reject values the worker loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 {
            return Err(ConfigError::Invalid(
                "channel_count must be at least 1".to_string(),
            ));
        }
        if self.buffer_size == 0 || self.buffer_size % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "buffer_size must be a positive multiple of 4, got {}",
                self.buffer_size
            )));
        }
        if self.output_rate == 0 {
            return Err(ConfigError::Invalid("output_rate must be non-zero".to_string()));
        }
        if self.hardware_volume_max < 100 {
            return Err(ConfigError::Invalid(format!(
                "hardware_volume_max must be at least 100, got {}",
                self.hardware_volume_max
            )));
        }
        Ok(())
    }

    /// Samples per channel that fit in one buffer for the given layout
    pub fn nsamples(&self, mode: PortMode) -> usize {
        self.buffer_size / (2 * mode.channels())
    }

    /// Get the config file path (in app's base directory)
    fn config_path() -> Result<PathBuf, ConfigError> {
        let exe_path = env::current_exe().map_err(|e| ConfigError::LoadFailed {
            path: "<current exe>".to_string(),
            source: Box::new(e),
        })?;
        let exe_dir = exe_path
            .parent()
            .ok_or_else(|| ConfigError::Invalid("Could not determine executable directory".to_string()))?;

        Ok(exe_dir.join("config").join("engine.json"))
    }

    /// Get the config file path (for display purposes)
    pub fn config_path_display() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}
