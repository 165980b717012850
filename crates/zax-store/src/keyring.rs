//! Identity keyring: the owner's comm keypair and the guest registry.
//!
//! The keyring is the source of truth for who a mailbox can talk to.
//! Guests are keyed by a free-form owner-chosen tag; each record holds
//! the guest's public key and its relay address `hpk = h2(pk)`. The
//! whole structure persists through the [`EncryptedStore`], so the
//! backing driver only ever sees ciphertext.
//!
//! ## Invariants
//!
//! - Two records with the same `pk` always carry the same `hpk`
//! - After any mutating call returns, the persisted registry equals the
//!   in-memory map

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use zax_crypto::{Hpk, Keys, PublicKey, SecretKey};

use crate::driver::StorageDriver;
use crate::encrypted_store::{EncryptedStore, StoreOptions};
use crate::{Result, StoreError};

/// Default tag of the persisted comm-key row.
pub const DEFAULT_COMM_KEY_TAG: &str = "comm_key";

/// Default tag of the persisted guest-registry row.
pub const DEFAULT_GUEST_REGISTRY_TAG: &str = "guest_registry";

/// Reserved key marking the comm secret inside a backup.
///
/// A backup entry under this name is never treated as a guest.
pub const BACKUP_COMM_KEY: &str = "__::commKey::__";

/// Namespace constants for keyring rows, extending [`StoreOptions`].
#[derive(Clone, Debug)]
pub struct KeyringOptions {
    /// Options for the underlying encrypted store.
    pub store: StoreOptions,
    /// Tag of the comm-key row.
    pub comm_key_tag: String,
    /// Tag of the guest-registry row.
    pub guest_registry_tag: String,
}

impl Default for KeyringOptions {
    fn default() -> Self {
        Self {
            store: StoreOptions::default(),
            comm_key_tag: DEFAULT_COMM_KEY_TAG.into(),
            guest_registry_tag: DEFAULT_GUEST_REGISTRY_TAG.into(),
        }
    }
}

/// A registered guest: public key plus derived relay address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuestRecord {
    /// The guest's long-term public key.
    pub pk: PublicKey,
    /// `base64(h2(pk))`, the address the relay routes by.
    pub hpk: Hpk,
}

impl GuestRecord {
    /// Build a record, deriving the address from the key.
    pub fn new(pk: PublicKey) -> Self {
        let hpk = Hpk::from_public_key(&pk);
        Self { pk, hpk }
    }
}

/// Persisted shape of the comm keypair.
#[derive(Serialize, Deserialize)]
struct CommKeyRow {
    sk: String,
}

/// The owner's keyring.
pub struct Keyring {
    store: EncryptedStore,
    options: KeyringOptions,
    comm_keys: Keys,
    guests: HashMap<String, GuestRecord>,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("id", &self.store.id())
            .field("guests", &self.guests.len())
            .finish_non_exhaustive()
    }
}

impl Keyring {
    /// Open (or create) the keyring for mailbox `id`.
    ///
    /// Loads the comm keypair if one is persisted; otherwise generates
    /// a fresh pair and persists it. The guest registry loads as-is, or
    /// starts empty.
    pub async fn new(
        driver: Arc<dyn StorageDriver>,
        id: &str,
        options: KeyringOptions,
    ) -> Result<Self> {
        let store = EncryptedStore::open(driver, id, options.store.clone()).await?;

        let comm_keys = match store.get::<CommKeyRow>(&options.comm_key_tag).await? {
            Some(row) => Keys::from_secret_key(
                SecretKey::from_base64(&row.sk)
                    .map_err(|_| StoreError::Corruption("comm key row".into()))?,
            ),
            None => {
                let keys = Keys::generate();
                Self::persist_comm(&store, &options, &keys).await?;
                debug!(id, "generated comm keypair");
                keys
            }
        };

        let guests: Vec<(String, GuestRecord)> = store
            .get(&options.guest_registry_tag)
            .await?
            .unwrap_or_default();

        Ok(Self {
            store,
            options,
            comm_keys,
            guests: guests.into_iter().collect(),
        })
    }

    /// Recreate a keyring from a [`backup`] string.
    ///
    /// Sets the comm key from the embedded secret, then registers every
    /// other entry as a guest.
    ///
    /// [`backup`]: Keyring::backup
    pub async fn from_backup(
        driver: Arc<dyn StorageDriver>,
        id: &str,
        options: KeyringOptions,
        backup: &str,
    ) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_str(backup)
            .map_err(|e| StoreError::Serialization(format!("backup: {}", e)))?;

        let sk = entries
            .get(BACKUP_COMM_KEY)
            .ok_or_else(|| StoreError::Corruption("backup is missing the comm key".into()))?;

        let mut keyring = Self::new(driver, id, options).await?;
        keyring
            .set_comm_from_sec_key(
                SecretKey::from_base64(sk)
                    .map_err(|_| StoreError::Corruption("backup comm key".into()))?,
            )
            .await?;

        for (tag, pk) in &entries {
            if tag == BACKUP_COMM_KEY {
                continue;
            }
            let pk = PublicKey::from_base64(pk)
                .map_err(|_| StoreError::Corruption(format!("backup guest {:?}", tag)))?;
            keyring.add_guest(tag, pk).await?;
        }
        Ok(keyring)
    }

    /// Register (or overwrite) a guest under `tag` and persist.
    pub async fn add_guest(&mut self, tag: &str, pk: PublicKey) -> Result<()> {
        self.guests.insert(tag.to_string(), GuestRecord::new(pk));
        self.save_registry().await
    }

    /// Remove the guest under `tag` and persist.
    ///
    /// Returns `true` if a record was removed.
    pub async fn remove_guest(&mut self, tag: &str) -> Result<bool> {
        let removed = self.guests.remove(tag).is_some();
        if removed {
            self.save_registry().await?;
        }
        Ok(removed)
    }

    /// The owner's public comm key.
    pub fn pub_comm_key(&self) -> &PublicKey {
        &self.comm_keys.public_key
    }

    /// The owner's secret comm key.
    pub fn private_comm_key(&self) -> &SecretKey {
        &self.comm_keys.secret_key
    }

    /// The owner's comm keypair.
    pub fn comm_keys(&self) -> &Keys {
        &self.comm_keys
    }

    /// The owner's relay address, `h2(pub_comm_key)`.
    pub fn hpk(&self) -> Hpk {
        Hpk::from_public_key(&self.comm_keys.public_key)
    }

    /// The public key registered under `tag`.
    pub fn guest_key(&self, tag: &str) -> Option<&PublicKey> {
        self.guests.get(tag).map(|record| &record.pk)
    }

    /// The full record registered under `tag`.
    pub fn guest_record(&self, tag: &str) -> Option<&GuestRecord> {
        self.guests.get(tag)
    }

    /// Reverse lookup: which tag has this relay address?
    ///
    /// Linear scan; registries hold at most hundreds of guests.
    pub fn tag_by_hpk(&self, hpk: &Hpk) -> Option<&str> {
        self.guests
            .iter()
            .find(|(_, record)| &record.hpk == hpk)
            .map(|(tag, _)| tag.as_str())
    }

    /// Number of registered guests.
    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }

    /// All registered tags, sorted.
    pub fn guest_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.guests.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Replace the comm keypair with one derived from `seed` and persist.
    pub async fn set_comm_from_seed(&mut self, seed: &[u8]) -> Result<()> {
        self.comm_keys = Keys::from_seed(seed);
        Self::persist_comm(&self.store, &self.options, &self.comm_keys).await
    }

    /// Replace the comm keypair with one rebuilt from `sk` and persist.
    pub async fn set_comm_from_sec_key(&mut self, sk: SecretKey) -> Result<()> {
        self.comm_keys = Keys::from_secret_key(sk);
        Self::persist_comm(&self.store, &self.options, &self.comm_keys).await
    }

    /// Serialize the keyring as a portable backup string.
    ///
    /// The result is a flat JSON map: the comm secret under
    /// [`BACKUP_COMM_KEY`], every guest tag mapped to its public key.
    pub fn backup(&self) -> Result<String> {
        let mut entries = BTreeMap::new();
        entries.insert(
            BACKUP_COMM_KEY.to_string(),
            self.comm_keys.secret_key.to_base64(),
        );
        for (tag, record) in &self.guests {
            entries.insert(tag.clone(), record.pk.to_base64());
        }
        serde_json::to_string(&entries).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Remove every keyring-owned row, then destroy the storage key.
    pub async fn self_destruct(self) -> Result<()> {
        self.store.remove(&self.options.comm_key_tag).await?;
        self.store.remove(&self.options.guest_registry_tag).await?;
        self.store.self_destruct().await
    }

    /// Direct access to the underlying encrypted store, for values the
    /// owner wants persisted alongside the keyring.
    pub fn store(&self) -> &EncryptedStore {
        &self.store
    }

    async fn persist_comm(
        store: &EncryptedStore,
        options: &KeyringOptions,
        keys: &Keys,
    ) -> Result<()> {
        let row = CommKeyRow {
            sk: keys.secret_key.to_base64(),
        };
        store.save(&options.comm_key_tag, &row).await
    }

    async fn save_registry(&self) -> Result<()> {
        // Sorted so the persisted row is a pure function of the map.
        let mut entries: Vec<(&String, &GuestRecord)> = self.guests.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        self.store
            .save(&self.options.guest_registry_tag, &entries)
            .await
    }
}
