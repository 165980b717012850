//! Curve25519 communication keys.
//!
//! Every mailbox owns one long-term comm keypair; relay sessions own
//! short-lived ephemeral pairs of the same shape.
//!
//! ## Security Notes
//!
//! - Secret keys are zeroized on drop
//! - Keys are generated from OsRng
//! - The seed derivation path is `sk = sha512(seed)[..32]`

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{b64, CryptoError, Result};

/// Size of a Curve25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a Curve25519 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// A Curve25519 public key.
///
/// Serializes as a standard Base64 string, matching the wire and
/// persisted-state representation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl PublicKey {
    /// Create from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from a Base64 string.
    pub fn from_base64(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: b64::decode_array(s)?,
        })
    }

    /// Get the key as a byte array.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// Convert to owned byte array.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.bytes
    }

    /// Encode as a Base64 string.
    pub fn to_base64(&self) -> String {
        b64::encode(self.bytes)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({:02x}{:02x}..)", self.bytes[0], self.bytes[1])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// A Curve25519 secret key.
///
/// Zeroized on drop. Intentionally not `Clone`: secret material should
/// not be duplicated in memory by accident.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; SECRET_KEY_SIZE],
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes.
    ///
    /// # Security
    ///
    /// Only use bytes from a secure source.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SECRET_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from a Base64 string.
    pub fn from_base64(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: b64::decode_array(s)?,
        })
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.bytes);
        let public = x25519_dalek::PublicKey::from(&secret);
        PublicKey {
            bytes: public.to_bytes(),
        }
    }

    /// Get raw bytes (for persistence).
    ///
    /// # Security
    ///
    /// Handle with care - this exposes the secret key.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.bytes
    }

    /// Encode as a Base64 string (for persistence and backup).
    pub fn to_base64(&self) -> String {
        b64::encode(self.bytes)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A Curve25519 keypair.
///
/// Owns both halves; guest entries elsewhere hold only a [`PublicKey`].
pub struct Keys {
    /// The public half.
    pub public_key: PublicKey,
    /// The secret half.
    pub secret_key: SecretKey,
}

impl Keys {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public_key();
        Self {
            public_key,
            secret_key,
        }
    }

    /// Rebuild a keypair from its secret half.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self {
            public_key,
            secret_key,
        }
    }

    /// Derive a keypair deterministically from a seed.
    ///
    /// The secret key is the first 32 bytes of `sha512(seed)`; the
    /// public key follows from it. The same seed always yields the
    /// same pair.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hash: [u8; 64] = Sha512::digest(seed).into();
        let mut sk = [0u8; SECRET_KEY_SIZE];
        sk.copy_from_slice(&hash[..SECRET_KEY_SIZE]);
        hash.zeroize();
        let secret_key = SecretKey { bytes: sk };
        Self::from_secret_key(secret_key)
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keys {{ public_key: {:?}, secret_key: [REDACTED] }}", self.public_key)
    }
}
