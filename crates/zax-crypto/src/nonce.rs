//! Timestamped 24-byte nonces.
//!
//! Zax nonces carry a coarse header inside an otherwise random value:
//! bytes `[0..8)` hold the big-endian Unix-seconds timestamp and, when a
//! caller supplies one, bytes `[8..12)` hold a big-endian `u32`. The
//! remaining bytes keep the randomness of the initially drawn nonce.
//! Relays use the timestamp to reject stale traffic; the `u32` slot lets
//! file transfers tag a nonce with a chunk number.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::random::random_bytes;
use crate::{b64, CryptoError, Result};

/// Size of a box/secretbox nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// A 24-byte NaCl nonce.
///
/// Serializes as a Base64 string.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Draw a fully random nonce.
    pub fn generate() -> Result<Self> {
        let bytes = random_bytes(NONCE_SIZE)?;
        Self::from_bytes(&bytes)
    }

    /// Create from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 24 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from a Base64 string.
    pub fn from_base64(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: b64::decode_array(s)?,
        })
    }

    /// Get the nonce as a byte array.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Encode as a Base64 string.
    pub fn to_base64(&self) -> String {
        b64::encode(self.bytes)
    }

    /// Read the big-endian Unix-seconds timestamp in bytes `[0..8)`.
    pub fn timestamp(&self) -> u64 {
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&self.bytes[..8]);
        u64::from_be_bytes(ts)
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({:02x}{:02x}..)", self.bytes[0], self.bytes[1])
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Build a timestamped nonce.
///
/// Starts from a fully random 24-byte nonce, zeroes the header area
/// (8 bytes, or 12 when `extra` is supplied), then writes the current
/// Unix-seconds timestamp big-endian into bytes `[0..8)` and `extra`
/// big-endian into bytes `[8..12)`.
///
/// # Errors
///
/// Returns `CryptoError::Rng` if the RNG yields the wrong width.
pub fn make_nonce(extra: Option<u32>) -> Result<Nonce> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CryptoError::Rng(format!("system clock before epoch: {}", e)))?
        .as_secs();
    make_nonce_at(now, extra)
}

/// [`make_nonce`] with an explicit timestamp, for deterministic tests.
pub fn make_nonce_at(unix_seconds: u64, extra: Option<u32>) -> Result<Nonce> {
    let mut nonce = Nonce::generate()?;

    let header = if extra.is_some() { 12 } else { 8 };
    nonce.bytes[..header].fill(0);

    nonce.bytes[..8].copy_from_slice(&unix_seconds.to_be_bytes());
    if let Some(extra) = extra {
        nonce.bytes[8..12].copy_from_slice(&extra.to_be_bytes());
    }
    Ok(nonce)
}
