//! Error types for the component library.

use thiserror::Error;

/// Component errors.
///
/// Ordinary delivery failures are not errors; they are reported through
/// [`crate::sender::SendOutcome`] and handled at the call site. Everything
/// here is a startup-time or internal condition.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// IO error (network, file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (missing or malformed setting)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection to the routing fabric failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Component handshake with the routing fabric was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComponentError {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
