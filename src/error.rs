//! Error types for the Sage gateway

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Sage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Sage gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed directive supplied by a caller
    #[error("directive error: {0}")]
    Directive(String),

    /// Domain/service pair not present in the capability table
    #[error("service not allowed: {domain}.{service}")]
    Unauthorized {
        /// Directive domain
        domain: String,
        /// Directive service
        service: String,
    },

    /// Automation backend answered with a non-success status
    #[error("dispatch failed ({status}): {body}")]
    Dispatch {
        /// HTTP status code
        status: u16,
        /// Response body, best effort
        body: String,
    },

    /// Automation backend did not answer in time
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
