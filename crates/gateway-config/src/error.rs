//! Configuration errors.

use gateway_core::GatewayError;
use std::path::PathBuf;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read configuration file {path:?}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML/TOML for the schema
    #[error("Failed to parse configuration {path}: {message}")]
    Parse {
        /// File path or format name
        path: String,
        /// Parser message
        message: String,
    },

    /// File extension is neither YAML nor TOML
    #[error("Unsupported configuration format {0:?} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(PathBuf),

    /// An environment override could not be parsed
    #[error("Invalid value for environment variable {name}: {value:?}")]
    InvalidEnv {
        /// Variable name
        name: String,
        /// Raw value
        value: String,
    },

    /// A value is out of range or inconsistent
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<ConfigError> for GatewayError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}
