//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing storage driver failed.
    #[error("Storage driver error: {0}")]
    Driver(String),

    /// Value serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persisted state is inconsistent (e.g. a ciphertext row
    /// without its nonce row where one is required).
    #[error("Storage corruption: {0}")]
    Corruption(String),

    /// Cryptographic error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] zax_crypto::CryptoError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
