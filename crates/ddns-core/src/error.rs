//! Error types for the DDNS scheduler
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown task identifier
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Every address detection service failed
    #[error("All address services are unavailable")]
    AllServicesUnavailable,

    /// A single address service or interface could not produce an address
    #[error("Address source error: {0}")]
    AddressSource(String),

    /// Remote DNS API rejected a call; the message is kept as the provider sent it
    #[error("Provider error ({provider}): {message}")]
    ProviderApi {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Malformed input on add/update
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Task store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "task not found" error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an address source error
    pub fn address_source(msg: impl Into<String>) -> Self {
        Self::AddressSource(msg.into())
    }

    /// Create a provider API error
    pub fn provider_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether the failure is likely to clear up on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AllServicesUnavailable
                | Self::AddressSource(_)
                | Self::Timeout(_)
                | Self::Http(_)
                | Self::Io(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
