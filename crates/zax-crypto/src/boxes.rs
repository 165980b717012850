//! NaCl `box` and `secretbox` operations.
//!
//! Asymmetric envelopes use Curve25519-XSalsa20-Poly1305 (`box`);
//! symmetric envelopes use XSalsa20-Poly1305 (`secretbox`). Both are
//! authenticated: opening fails on any tampering.
//!
//! ## Security Notes
//!
//! - Symmetric keys are zeroized on drop
//! - Nonces come from [`make_nonce`] (timestamped header, random tail)
//! - NEVER reuse a nonce with the same key

use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
use crypto_secretbox::aead::KeyInit;
use crypto_secretbox::XSalsa20Poly1305;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::{PublicKey, SecretKey};
use crate::nonce::{make_nonce, Nonce};
use crate::random::random_bytes;
use crate::{b64, CryptoError, Result};

/// Size of a secretbox key in bytes.
pub const SECRETBOX_KEY_SIZE: usize = 32;

/// A 32-byte symmetric key for `secretbox`.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretboxKey {
    bytes: [u8; SECRETBOX_KEY_SIZE],
}

impl SecretboxKey {
    /// Generate a new random key.
    pub fn generate() -> Result<Self> {
        let bytes = random_bytes(SECRETBOX_KEY_SIZE)?;
        Self::from_bytes(&bytes)
    }

    /// Create from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRETBOX_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRETBOX_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SECRETBOX_KEY_SIZE];
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
    ///
    /// # Security
    ///
    /// Avoid logging or persisting the returned bytes in cleartext.
    pub fn as_bytes(&self) -> &[u8; SECRETBOX_KEY_SIZE] {
        &self.bytes
    }

    /// Encode as a Base64 string.
    pub fn to_base64(&self) -> String {
        b64::encode(self.bytes)
    }
}

impl std::fmt::Debug for SecretboxKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretboxKey([REDACTED])")
    }
}

/// The envelope produced by `box` or `secretbox`.
///
/// Serializes as `{ "nonce": base64, "ctext": base64 }`, the form every
/// Zax payload and persisted row uses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// The 24-byte nonce the envelope was sealed with.
    pub nonce: Nonce,
    /// The ciphertext with authentication tag appended.
    #[serde(with = "crate::b64::vec")]
    pub ctext: Vec<u8>,
}

/// Encrypt with `secretbox` under an explicit nonce.
pub fn secretbox(msg: &[u8], nonce: &Nonce, key: &SecretboxKey) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(nonce.as_bytes().into(), msg)
        .map_err(|_| CryptoError::Encryption("secretbox failed".into()))
}

/// Open a `secretbox` ciphertext.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on tampering or a wrong key.
pub fn secretbox_open(ctext: &[u8], nonce: &Nonce, key: &SecretboxKey) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(nonce.as_bytes().into(), ctext)
        .map_err(|_| CryptoError::Decryption)
}

/// Seal a message with `secretbox` under a fresh timestamped nonce.
pub fn secretbox_seal(msg: &[u8], key: &SecretboxKey) -> Result<EncryptedMessage> {
    let nonce = make_nonce(None)?;
    let ctext = secretbox(msg, &nonce, key)?;
    Ok(EncryptedMessage { nonce, ctext })
}

/// Encrypt with `box` under an explicit nonce.
///
/// `pk_recv` is the recipient's public key, `sk_send` the sender's
/// secret key.
pub fn box_encrypt(
    msg: &[u8],
    nonce: &Nonce,
    pk_recv: &PublicKey,
    sk_send: &SecretKey,
) -> Result<Vec<u8>> {
    let cipher = SalsaBox::new(
        &crypto_box::PublicKey::from(*pk_recv.as_bytes()),
        &crypto_box::SecretKey::from(*sk_send.as_bytes()),
    );
    cipher
        .encrypt(nonce.as_bytes().into(), msg)
        .map_err(|_| CryptoError::Encryption("box failed".into()))
}

/// Open a `box` ciphertext.
///
/// `pk_send` is the sender's public key, `sk_recv` the recipient's
/// secret key.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on tampering or a key mismatch.
pub fn box_open(
    ctext: &[u8],
    nonce: &Nonce,
    pk_send: &PublicKey,
    sk_recv: &SecretKey,
) -> Result<Vec<u8>> {
    let cipher = SalsaBox::new(
        &crypto_box::PublicKey::from(*pk_send.as_bytes()),
        &crypto_box::SecretKey::from(*sk_recv.as_bytes()),
    );
    cipher
        .decrypt(nonce.as_bytes().into(), ctext)
        .map_err(|_| CryptoError::Decryption)
}

/// Seal a message toward a recipient under a fresh timestamped nonce.
pub fn box_seal(msg: &[u8], pk_recv: &PublicKey, sk_send: &SecretKey) -> Result<EncryptedMessage> {
    let nonce = make_nonce(None)?;
    let ctext = box_encrypt(msg, &nonce, pk_recv, sk_send)?;
    Ok(EncryptedMessage { nonce, ctext })
}

/// Open a sealed envelope from a sender.
pub fn box_open_msg(
    message: &EncryptedMessage,
    pk_send: &PublicKey,
    sk_recv: &SecretKey,
) -> Result<Vec<u8>> {
    box_open(&message.ctext, &message.nonce, pk_send, sk_recv)
}
