//! # Config Loader
//!
//! Loads and validates the safety engine configuration.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files (format from the extension)
//! - Validate ranges and cross-field rules before anything starts
//! - Produce a `SafetyConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("traffic_guard.toml")).unwrap();
//! println!("Camera: {}", config.source.camera_id);
//! ```

mod parser;
mod validator;

pub use contracts::SafetyConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file path
    ///
    /// Format is detected from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SafetyConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load from a file when given, otherwise validated defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<SafetyConfig, ContractError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let config = SafetyConfig::default();
                Self::validate(&config)?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a string
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<SafetyConfig, ContractError> {
        let config = parser::parse(content, format)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation (e.g. after command-line overrides)
    pub fn validate(config: &SafetyConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &SafetyConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &SafetyConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
