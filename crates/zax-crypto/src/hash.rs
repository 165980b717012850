//! SHA-256 hashing and the relay address derivation.
//!
//! The relay never sees a public key: it routes by `h2(pk)`, the
//! double-SHA-256 with a 64-byte zero prefix on the inner call
//! (the Dodis hash-of-hash construction).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::keys::PublicKey;
use crate::{b64, CryptoError, Result};

/// Size of a SHA-256 digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Width of the zero pad prepended to the inner hash input.
const H2_PAD: usize = 64;

/// Plain SHA-256.
pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    let digest = Sha256::digest(data);
    digest.into()
}

/// Double hash: `sha256(sha256(0^64 || data))`.
///
/// Used everywhere the protocol needs a one-way, relay-visible
/// commitment: mailbox addresses, handshake digests, ownership proofs.
pub fn h2(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update([0u8; H2_PAD]);
    hasher.update(data);
    let inner: [u8; HASH_SIZE] = hasher.finalize().into();
    sha256(&inner)
}

/// A mailbox address: `h2(publicKey)`, the identifier the relay routes by.
///
/// Equality is constant-time. Serializes as a Base64 string.
#[derive(Clone)]
pub struct Hpk {
    bytes: [u8; HASH_SIZE],
}

impl Hpk {
    /// Derive the address of a public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self {
            bytes: h2(pk.as_bytes()),
        }
    }

    /// Create from raw digest bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(CryptoError::InvalidHashLength {
                expected: HASH_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from a Base64 string.
    pub fn from_base64(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: b64::decode_array(s)?,
        })
    }

    /// Get the address as a byte array.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.bytes
    }

    /// Encode as a Base64 string.
    pub fn to_base64(&self) -> String {
        b64::encode(self.bytes)
    }
}

impl ConstantTimeEq for Hpk {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.bytes.ct_eq(&other.bytes)
    }
}

impl PartialEq for Hpk {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Hpk {}

impl std::fmt::Debug for Hpk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hpk({:02x}{:02x}..)", self.bytes[0], self.bytes[1])
    }
}

impl std::fmt::Display for Hpk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl Serialize for Hpk {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Hpk {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}
