//! Encrypted key-value store over a [`StorageDriver`].
//!
//! Each saved item becomes two driver rows: the secretbox ciphertext
//! and, under a `__nc.`-prefixed companion key, the nonce it was sealed
//! with. The storage-wide symmetric key lives in its own well-known
//! slot and is generated on first open.
//!
//! ## Security
//!
//! - Values are serialized to JSON and sealed with `secretbox`
//! - Every item gets a fresh nonce
//! - A row that fails authentication is an error, never a silent miss
//! - `self_destruct` removes the storage key, rendering every remaining
//!   row irrecoverable

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use zax_crypto::{b64, secretbox_open, secretbox_seal, Nonce, SecretboxKey};

use crate::driver::StorageDriver;
use crate::{Result, StoreError};

/// Default suffix appended to every persisted key.
pub const DEFAULT_STORAGE_ROOT: &str = ".v2.stor.vlt12";

/// Default prefix of the companion nonce row.
pub const DEFAULT_NONCE_TAG: &str = "__nc";

/// Default tag of the storage-key slot.
pub const DEFAULT_STORAGE_KEY_TAG: &str = "storage_key";

/// Namespace constants for persisted rows.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Suffix appended to every row key.
    pub storage_root: String,
    /// Prefix of the companion nonce row.
    pub nonce_tag: String,
    /// Tag under which the storage key itself is persisted.
    pub storage_key_tag: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            storage_root: DEFAULT_STORAGE_ROOT.into(),
            nonce_tag: DEFAULT_NONCE_TAG.into(),
            storage_key_tag: DEFAULT_STORAGE_KEY_TAG.into(),
        }
    }
}

/// Symmetric envelope around an untyped storage driver.
///
/// Cheap to clone is not a goal here; the store is owned by one keyring
/// and shared behind it.
pub struct EncryptedStore {
    driver: Arc<dyn StorageDriver>,
    id: String,
    options: StoreOptions,
    key: SecretboxKey,
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl EncryptedStore {
    /// Open the store for mailbox `id`.
    ///
    /// Loads the storage key from its slot, or generates and persists a
    /// fresh 32-byte key on first open.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corruption` if the persisted key slot holds
    /// something that is not a 32-byte key.
    pub async fn open(
        driver: Arc<dyn StorageDriver>,
        id: &str,
        options: StoreOptions,
    ) -> Result<Self> {
        let slot = format!("{}.{}{}", options.storage_key_tag, id, options.storage_root);
        let key = match driver.get(&slot).await? {
            Some(wrapped) => {
                let encoded: String = serde_json::from_str(&wrapped)
                    .map_err(|e| StoreError::Corruption(format!("storage key slot: {}", e)))?;
                SecretboxKey::from_base64(&encoded)
                    .map_err(|_| StoreError::Corruption("storage key is not 32 bytes".into()))?
            }
            None => {
                let key = SecretboxKey::generate()?;
                let wrapped = serde_json::to_string(&key.to_base64())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                driver.set(&slot, &wrapped).await?;
                debug!(id, "generated storage key");
                key
            }
        };

        Ok(Self {
            driver,
            id: id.to_string(),
            options,
            key,
        })
    }

    /// Serialize `value` to JSON, seal it, and write both rows.
    pub async fn save<T: Serialize + ?Sized>(&self, tag: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let sealed = secretbox_seal(json.as_bytes(), &self.key)?;

        self.driver
            .set(&self.row_key(tag), &b64::encode(&sealed.ctext))
            .await?;
        self.driver
            .set(&self.nonce_row_key(tag), &sealed.nonce.to_base64())
            .await?;
        Ok(())
    }

    /// Read, decrypt, and deserialize the value stored under `tag`.
    ///
    /// Returns `None` when either the ciphertext or its nonce row is
    /// missing.
    ///
    /// # Errors
    ///
    /// An authentication failure on a present row is
    /// `StoreError::Crypto`, not a miss.
    pub async fn get<T: DeserializeOwned>(&self, tag: &str) -> Result<Option<T>> {
        let ctext = self.driver.get(&self.row_key(tag)).await?;
        let nonce = self.driver.get(&self.nonce_row_key(tag)).await?;

        let (ctext, nonce) = match (ctext, nonce) {
            (Some(c), Some(n)) => (c, n),
            _ => return Ok(None),
        };

        let ctext = b64::decode(&ctext)?;
        let nonce = Nonce::from_base64(&nonce)?;
        let plain = secretbox_open(&ctext, &nonce, &self.key)?;

        let value = serde_json::from_slice(&plain)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(value))
    }

    /// Remove both rows of `tag`. Removing a missing tag is not an error.
    pub async fn remove(&self, tag: &str) -> Result<()> {
        self.driver.remove(&self.row_key(tag)).await?;
        self.driver.remove(&self.nonce_row_key(tag)).await?;
        Ok(())
    }

    /// Remove the storage-key slot.
    ///
    /// Existing rows stay in the driver but can never be decrypted
    /// again.
    pub async fn self_destruct(&self) -> Result<()> {
        let slot = self.row_key(&self.options.storage_key_tag);
        self.driver.remove(&slot).await?;
        debug!(id = %self.id, "storage key destroyed");
        Ok(())
    }

    /// The mailbox id this store was opened for.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn row_key(&self, tag: &str) -> String {
        format!("{}.{}{}", tag, self.id, self.options.storage_root)
    }

    fn nonce_row_key(&self, tag: &str) -> String {
        self.row_key(&format!("{}.{}", self.options.nonce_tag, tag))
    }
}
