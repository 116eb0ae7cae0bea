use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::event::{StorageEvent, StoreScope};
use super::{
    CachedStorage, InMemoryArea, JsonFileArea, LocalStorage, MemoryBackend, PrefixedStorage,
    RemoteBackend, Storage, StorageArea, StorageBackend, StorageHandle,
};
use crate::codec::Value;
use crate::config::{BackendKind, LocalAreaKind, StoreConfig};
use crate::errors::{Result, StorageError};
use crate::net::{HttpTransport, ReqwestTransport};

/// A handle for receiving storage change notifications.
pub type Subscription = broadcast::Receiver<StorageEvent>;

#[derive(Debug)]
struct StorageBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl StorageBus {
    fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    fn subscribe(&self) -> Subscription {
        self.tx.subscribe()
    }

    fn publish(&self, ev: StorageEvent) {
        // send() only fails without receivers, and then nobody cares
        let _ = self.tx.send(ev);
    }
}

/// The process-wide stores, built once and shared by cloning.
///
/// - [`storage`](Self::storage): the default store, a [`CachedStorage`]
///   over the configured bulk backend.
/// - [`large_storage`](Self::large_storage): the default store under the
///   `large-` namespace, for payloads such as uploaded images.
/// - [`cache_storage`](Self::cache_storage): local storage under the `_`
///   namespace, for data that can be regenerated.
///
/// Every change made through these handles is published to subscribers.
#[derive(Clone)]
pub struct StorageService {
    storage: StorageHandle,
    large: StorageHandle,
    cache: StorageHandle,
    bus: Arc<StorageBus>,
}

impl Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService").finish_non_exhaustive()
    }
}

impl StorageService {
    /// Wraps already-built stores.
    pub fn new(
        storage: StorageHandle,
        large: StorageHandle,
        cache: StorageHandle,
        channel_capacity: usize,
    ) -> Self {
        let bus = Arc::new(StorageBus::new(channel_capacity));
        Self {
            storage: notifying(storage, StoreScope::Default, &bus),
            large: notifying(large, StoreScope::Large, &bus),
            cache: notifying(cache, StoreScope::Cache, &bus),
            bus,
        }
    }

    /// Builds the stores described by `config`, talking HTTP through reqwest.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.user_agent)?);
        Self::with_transport(config, transport)
    }

    /// Builds the stores described by `config` on top of `transport`.
    pub fn with_transport(config: &StoreConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Remote => {
                let url = config.remote_base_url()?;
                log::info!("[Storage] Using remote storage at {url}");
                Arc::new(
                    RemoteBackend::new(url, transport)
                        .with_max_keys_header_len(config.max_keys_header_len),
                )
            }
            BackendKind::Memory => {
                log::info!("[Storage] Using in-memory storage");
                Arc::new(MemoryBackend::new())
            }
        };

        let storage: StorageHandle = Arc::new(CachedStorage::new(backend));
        let large: StorageHandle = Arc::new(PrefixedStorage::new(
            storage.clone(),
            config.large_prefix.as_str(),
        )?);

        let local = LocalStorage::new(local_area(config)?)
            .with_quota_recovery(config.quota_recovery)
            .preserving(config.preserved_keys.clone());
        let cache: StorageHandle = Arc::new(PrefixedStorage::new(
            Arc::new(local),
            config.cache_prefix.as_str(),
        )?);

        Ok(Self::new(storage, large, cache, config.event_channel_capacity))
    }

    /// The default store.
    pub fn storage(&self) -> StorageHandle {
        self.storage.clone()
    }

    /// Store for large values, namespaced inside the default store.
    pub fn large_storage(&self) -> StorageHandle {
        self.large.clone()
    }

    /// Store for regenerable data, namespaced inside local storage.
    pub fn cache_storage(&self) -> StorageHandle {
        self.cache.clone()
    }

    pub fn store(&self, scope: StoreScope) -> StorageHandle {
        match scope {
            StoreScope::Default => self.storage(),
            StoreScope::Large => self.large_storage(),
            StoreScope::Cache => self.cache_storage(),
        }
    }

    /// Receives an event for every change made through this service.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }
}

fn local_area(config: &StoreConfig) -> Result<Arc<dyn StorageArea>> {
    let quota = config.local_quota_bytes;
    let area: Arc<dyn StorageArea> = match &config.local_area {
        LocalAreaKind::Memory => match quota {
            Some(bytes) => Arc::new(InMemoryArea::with_quota(bytes)),
            None => Arc::new(InMemoryArea::new()),
        },
        LocalAreaKind::JsonFile(path) => Arc::new(JsonFileArea::open(path.clone(), quota)?),
        #[cfg(feature = "sqlite_local_store")]
        LocalAreaKind::Sqlite(path) => {
            let path = path.to_str().ok_or_else(|| {
                StorageError::InvalidConfig(format!("non UTF-8 path {}", path.display()))
            })?;
            Arc::new(super::SqliteArea::open(path, quota)?)
        }
        #[cfg(not(feature = "sqlite_local_store"))]
        LocalAreaKind::Sqlite(_) => {
            return Err(StorageError::InvalidConfig(
                "SQLite local storage needs the sqlite_local_store feature".to_string(),
            ))
        }
    };
    Ok(area)
}

fn notifying(inner: StorageHandle, scope: StoreScope, bus: &Arc<StorageBus>) -> StorageHandle {
    Arc::new(NotifyingStorage {
        inner,
        scope,
        bus: bus.clone(),
    })
}

/// Publishes a [`StorageEvent`] after every successful write to `inner`.
pub struct NotifyingStorage {
    inner: StorageHandle,
    scope: StoreScope,
    bus: Arc<StorageBus>,
}

impl NotifyingStorage {
    fn publish(&self, key: Option<&str>, new_value: Option<Value>) {
        self.bus.publish(StorageEvent {
            scope: self.scope,
            key: key.map(str::to_string),
            new_value,
        });
    }
}

#[async_trait]
impl Storage for NotifyingStorage {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        self.inner.get_all().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.set(key, value.clone()).await?;
        self.publish(Some(key), Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await?;
        self.publish(Some(key), None);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;
        self.publish(None, None);
        Ok(())
    }
}
