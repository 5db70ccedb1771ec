//! Error handling for the waylet core layer.
//!
//! Defines the error base shared by the workspace using the `thiserror`
//! crate. The main type is [`CoreError`], which wraps more specific
//! errors such as [`ConfigError`].

use thiserror::Error;

/// Core error type for the waylet workspace.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Errors related to runtime configuration validation.
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    /// Errors that occur during the initialization of the logging system.
    #[error("Logging Initialization Failed: {0}")]
    LoggingInitialization(String),

    /// General I/O errors not covered by more specific variants.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided to a core function.
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// Catch-all for unexpected internal errors within the core library.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Error type for configuration validation.
///
/// Configuration here is process-lifetime runtime configuration (buffer
/// counts, pixel formats, decoration toggles); there is no persisted
/// configuration file in this layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration field holds a value outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Two configuration fields are individually valid but mutually
    /// incompatible.
    #[error("Incompatible configuration: {0}")]
    Incompatible(String),

    /// The selected pixel format is not in the supported set.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),
}

/// Result alias used throughout the core crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
