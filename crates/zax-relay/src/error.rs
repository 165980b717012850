//! Error types for relay operations.

use thiserror::Error;

/// Errors that can occur while talking to a relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The HTTP transport failed (no response or a non-2xx status).
    #[error("Network error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Network {
        /// HTTP status code, when one was received.
        status: Option<u16>,
        /// Transport-level detail.
        message: String,
    },

    /// The relay violated the wire contract.
    #[error("Protocol error from {url}{}: {reason}", command.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Protocol {
        /// The relay URL.
        url: String,
        /// The command in flight, if any.
        command: Option<String>,
        /// What was wrong with the response.
        reason: String,
    },

    /// The HTTP call timed out.
    #[error("Request timed out")]
    Timeout,

    /// Programming error: an operation was issued in a state that
    /// cannot serve it.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Payload serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] zax_crypto::CryptoError),
}

impl RelayError {
    /// Build a [`RelayError::Protocol`] without a command context.
    pub fn protocol(url: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            command: None,
            reason: reason.into(),
        }
    }

    /// Build a [`RelayError::Protocol`] for a specific command.
    pub fn protocol_cmd(url: &str, command: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            command: Some(command.to_string()),
            reason: reason.into(),
        }
    }

    /// Whether this error is an HTTP 401 from the relay.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Network {
                status: Some(401),
                ..
            }
        )
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
