//! Error types surfaced at the mailbox API boundary.

use thiserror::Error;

use zax_relay::RelayError;
use zax_store::StoreError;

/// Errors that can occur during mailbox operations.
///
/// Errors bubble verbatim from the layer that produced them; nothing is
/// swallowed. The single documented recovery is inside `download`,
/// where a text message that fails to open falls through to plaintext
/// passthrough instead of erroring.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// The HTTP transport failed (no response or non-2xx).
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
        /// What was wrong.
        reason: String,
    },

    /// An authenticated decryption failed outside the passthrough case.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] zax_crypto::CryptoError),

    /// The named guest is not in the keyring.
    #[error("Unknown guest: {0}")]
    UnknownGuest(String),

    /// Programming error: an operation was issued in a state that
    /// cannot serve it.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// The HTTP call timed out, or the RNG failed a sanity check.
    #[error("Request timed out")]
    Timeout,

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Payload serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A whole-file fetch was requested before the upload finished.
    #[error("File {upload_id} is not complete: {status}")]
    FileIncomplete {
        /// The upload in question.
        upload_id: String,
        /// The status the relay reported.
        status: String,
    },
}

impl From<RelayError> for MailboxError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Network { status, message } => Self::Network { status, message },
            RelayError::Protocol {
                url,
                command,
                reason,
            } => Self::Protocol {
                url,
                command,
                reason,
            },
            RelayError::Timeout => Self::Timeout,
            RelayError::Invariant(detail) => Self::Invariant(detail),
            RelayError::Serialization(detail) => Self::Serialization(detail),
            RelayError::Crypto(e) => Self::Crypto(e),
        }
    }
}

impl MailboxError {
    /// Build a [`MailboxError::Protocol`] without a command context.
    pub(crate) fn protocol(url: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            command: None,
            reason: reason.into(),
        }
    }

    /// Build a [`MailboxError::Protocol`] for a specific command.
    pub(crate) fn protocol_cmd(url: &str, command: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.to_string(),
            command: Some(command.to_string()),
            reason: reason.into(),
        }
    }
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;
