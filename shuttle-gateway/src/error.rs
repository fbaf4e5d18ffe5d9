//! Error types for gateway operations
//!
//! Every call into the Gateway Execution Service or the authorization server
//! surfaces one of these variants.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport error - DNS, connect, TLS, timeout or body read failures
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status code
    #[error("Gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Authentication error - rejected device code, expired login, bad token
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file error while staging uploads or writing downloads
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Whether retrying the same idempotent request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
