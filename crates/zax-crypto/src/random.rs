//! Secure randomness.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::{CryptoError, Result};

/// Produce `n` bytes from the operating system CSPRNG.
///
/// # Errors
///
/// Returns `CryptoError::Rng` if the generator fails or returns a
/// buffer of the wrong width.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    if bytes.len() != n {
        return Err(CryptoError::Rng(format!(
            "requested {} bytes, got {}",
            n,
            bytes.len()
        )));
    }
    Ok(bytes)
}
