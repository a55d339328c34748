//! Error types for steadfast-core

use thiserror::Error;

/// Result type alias using steadfast-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and policy errors
///
/// Failures of the wrapped operations never use this type; they travel
/// through [`RetryError`](crate::retry::RetryError) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// A policy field violates its constraints
    #[error("Invalid retry policy: {field} {reason}")]
    InvalidPolicy { field: String, reason: String },

    /// A named policy was requested but is not configured
    #[error("Unknown retry policy: {name}")]
    UnknownPolicy { name: String },

    /// A policy file is not valid YAML or does not match the schema
    #[error("Failed to parse {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid policy error
    pub fn invalid_policy(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error for the file at `path`
    pub fn yaml_parse(path: impl Into<String>, source: serde_yaml_ng::Error) -> Self {
        Self::YamlParse {
            path: path.into(),
            source,
        }
    }

    /// Create an unknown policy error
    pub fn unknown_policy(name: impl Into<String>) -> Self {
        Self::UnknownPolicy { name: name.into() }
    }
}
