/*!
Configuration management for the ddcctl application.
*/

use anyhow::{Context, Result};
use ddcci::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub ddcci: DeviceConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            bus: BusConfig::default(),
            ddcci: DeviceConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.ddcci.validate()
            .with_context(|| format!("Invalid [ddcci] section in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// i2c-dev node the display is attached to
    pub device: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/i2c-0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddcci::LengthPolicy;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.ddcci.write_delay_ms = 80;
        original_config.ddcci.length_policy = LengthPolicy::Permissive;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.bus.device, PathBuf::from("/dev/i2c-0"));
        assert_eq!(config.ddcci.address, 0x37);
        assert_eq!(config.ddcci.write_delay_ms, 60);
        assert_eq!(config.ddcci.read_delay_ms, 60);
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            "[bus]\ndevice = \"/dev/i2c-4\"\n\n[ddcci]\naddress = 0x37\nlength_policy = \"permissive\"\n",
        )
        .unwrap();

        assert_eq!(config.bus.device, PathBuf::from("/dev/i2c-4"));
        assert_eq!(config.ddcci.length_policy, LengthPolicy::Permissive);
        assert_eq!(config.ddcci.reply_timeout_ms, 500);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[ddcci]\naddress = 200\n").unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_or_default("/nonexistent/ddcctl.toml").unwrap();
        assert_eq!(config, AppConfig::new());
    }
}
