use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use crate::codec::{self, Value};
use crate::errors::{Result, StorageError};
use crate::storage::backend::{KeySelector, StorageBackend};
use crate::storage::Storage;

type Values = HashMap<String, Value>;

/// Store that loads a bulk backend once and serves reads from memory.
///
/// The first access fetches every entry from the backend. Callers that
/// arrive while that load is in flight wait for it instead of starting
/// their own. A failed load is not remembered; the next access retries.
///
/// Writes go to the backend first and are applied to the cache only once
/// the backend accepted them, so the cache never shows a write the backend
/// rejected. Writes are serialised: the cache sees them in the same order
/// the backend did.
pub struct CachedStorage {
    backend: Arc<dyn StorageBackend>,
    values: OnceCell<Mutex<Values>>,
    write_lock: AsyncMutex<()>,
}

impl CachedStorage {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            values: OnceCell::new(),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Performs the initial load now rather than on first access.
    pub async fn preload(&self) -> Result<()> {
        self.values().await.map(|_| ())
    }

    /// Whether the initial load has completed.
    pub fn is_loaded(&self) -> bool {
        self.values.initialized()
    }

    async fn values(&self) -> Result<&Mutex<Values>> {
        self.values
            .get_or_try_init(|| async {
                let raw = self.backend.get(KeySelector::All).await?;
                log::info!("[Storage] Loaded {} values", raw.len());

                let values: Values = raw.into_iter().map(|(k, v)| (k, codec::decode(v))).collect();
                Ok::<_, StorageError>(Mutex::new(values))
            })
            .await
    }

    fn lock(values: &Mutex<Values>) -> MutexGuard<'_, Values> {
        values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        log::debug!("[Storage] Get All");
        let values = self.values().await?;
        let all = Self::lock(values).clone();
        Ok(all)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }

        log::debug!("[Storage] Get {key}");
        let values = self.values().await?;
        let value = Self::lock(values).get(key).cloned();
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        log::debug!("[Storage] Set {key}");
        let values = self.values().await?;
        let _write = self.write_lock.lock().await;

        let mut items = Map::new();
        items.insert(key.to_string(), codec::encode(&value));
        self.backend.set(items).await?;

        Self::lock(values).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        log::debug!("[Storage] Remove {key}");
        let values = self.values().await?;
        let _write = self.write_lock.lock().await;

        self.backend.remove(&[key.to_string()]).await?;
        Self::lock(values).remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        log::debug!("[Storage] Clear");
        let values = self.values().await?;
        let _write = self.write_lock.lock().await;

        self.backend.clear().await?;
        Self::lock(values).clear();
        Ok(())
    }
}
