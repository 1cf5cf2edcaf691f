//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce an `IngestConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("ingest.toml")).unwrap();
//! println!("workers: {}", config.pipeline.worker_count);
//! ```

mod parser;
mod validator;

pub use contracts::IngestConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// The format follows the file extension (.toml / .json).
    ///
    /// # Errors
    /// - Unsupported or missing extension
    /// - File read failure
    /// - Parse or validation failure
    pub fn load_from_path(path: &Path) -> Result<IngestConfig, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Parse then validate configuration text
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<IngestConfig, ContractError> {
        let config = format.parse(content)?;
        self::validator::validate(&config)?;
        Ok(config)
    }

    /// Validate a config assembled in code (e.g. defaults plus CLI overrides)
    pub fn validate(config: &IngestConfig) -> Result<(), ContractError> {
        self::validator::validate(config)
    }

    pub fn to_toml(config: &IngestConfig) -> Result<String, ContractError> {
        ConfigFormat::Toml.render(config)
    }

    pub fn to_json(config: &IngestConfig) -> Result<String, ContractError> {
        ConfigFormat::Json.render(config)
    }
}
