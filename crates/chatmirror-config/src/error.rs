//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Malformed config: {0}")]
    InvalidFormat(String),

    #[error("Bad setting {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Config references ${{{0}}} but it is not set")]
    EnvVarNotSet(String),

    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config is not valid TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}
