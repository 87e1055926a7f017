//! Core error types for cursebot-core.
//!
//! Action-level failures (a tap that didn't land, a template that never
//! appeared) are not errors -- they surface as `false` from the retry
//! executor and are handled locally. The types here cover the fatal and
//! loop-boundary cases only.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for cursebot-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Wait-profile store errors
    #[error("Wait store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// A numeric invariant does not hold
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Wait-profile store errors. Load failures are downgraded to warnings by
/// the caller; save failures surface at shutdown.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read wait profiles from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write wait profiles to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Wait profile snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
