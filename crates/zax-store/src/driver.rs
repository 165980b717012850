//! The externalized storage contract.
//!
//! The client does not own a database. Everything it persists goes
//! through this narrow string-valued driver, supplied by the embedding
//! application (browser local storage, a file, an OS keystore). The
//! crate ships [`MemoryDriver`] for tests and ephemeral mailboxes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;

/// Untyped key-value backing storage.
///
/// Values are opaque strings; encryption happens above this layer, so a
/// driver never sees plaintext. Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Read the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` at `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value at `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Bulk read. The default implementation loops over [`get`].
    ///
    /// [`get`]: StorageDriver::get
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Bulk remove. The default implementation loops over [`remove`].
    ///
    /// [`remove`]: StorageDriver::remove
    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// In-memory driver.
///
/// Data is lost when the driver is dropped. Useful for tests and
/// throwaway mailboxes.
#[derive(Default)]
pub struct MemoryDriver {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }

    /// Whether the driver holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.map.read().await.is_empty()
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver").finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map.write().await.remove(key);
        Ok(())
    }
}
