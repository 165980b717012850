//! Base64 helpers shared by every layer that touches the wire.
//!
//! All public-facing binary values in the Zax protocol are standard
//! (padded) Base64 strings, both on the wire and in persisted state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{CryptoError, Result};

/// Encode bytes as a standard Base64 string.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decode a standard Base64 string.
///
/// # Errors
///
/// Returns `CryptoError::InvalidBase64` if the input is not valid Base64.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}

/// Decode a Base64 string into a fixed-size array.
///
/// # Errors
///
/// Returns `CryptoError::InvalidBase64` on malformed input and
/// `CryptoError::InvalidKeyLength` when the decoded width is wrong.
pub fn decode_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode(s)?;
    if bytes.len() != N {
        return Err(CryptoError::InvalidKeyLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Serde adapter serializing `Vec<u8>` as a Base64 string.
pub mod vec {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as Base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::encode(bytes))
    }

    /// Deserialize bytes from Base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}
