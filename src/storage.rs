//! Storage layer for the dashboard.
//!
//! Application code reads and writes through one asynchronous contract, the
//! [`Storage`] trait (`get_all`, `get`, `set`, `remove`, `clear`), no matter
//! which backend sits underneath.
//!
//! # Stores
//!
//! - [`CachedStorage`]: loads everything from a bulk [`StorageBackend`]
//!   once, serves reads from memory and writes through. This is how the
//!   extension storage area (or the remote key/value service) is used.
//! - [`LocalStorage`]: no cache, every call goes to a synchronous
//!   [`StorageArea`]. Recovers once from a full area by wiping it.
//! - [`PrefixedStorage`]: carves a namespace out of another store.
//!
//! # Backends and areas
//!
//! - [`RemoteBackend`]: HTTP key/value service (`X-Keys` protocol).
//! - [`MemoryBackend`]: in-process bulk backend.
//! - [`InMemoryArea`], [`JsonFileArea`], [`SqliteArea`]: physical areas for
//!   [`LocalStorage`].
//!
//! # Wiring
//!
//! A [`StorageService`] builds the three long-lived stores (default, large
//! and cache) from a [`StoreConfig`](crate::config::StoreConfig) and
//! publishes a [`StorageEvent`] for every change made through them.
//!
//! ```no_run
//! use newtab_store::config::StoreConfig;
//! use newtab_store::storage::{StorageService, StorageExt};
//!
//! # async fn run() -> newtab_store::errors::Result<()> {
//! let config = StoreConfig::default().with_origin("http://dashboard.lan")?;
//! let service = StorageService::from_config(&config)?;
//!
//! let votes: Option<Vec<String>> = service.storage().get_as("background_votes").await?;
//! service.cache_storage().set("feed-cache", "…".into()).await?;
//! # Ok(())
//! # }
//! ```
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Value;
use crate::errors::Result;

/// Physical area module, defining the synchronous key/value surface.
pub mod area;
/// Bulk backends underneath cached stores.
pub mod backend;
/// Cached, write-through store.
pub mod cached;
/// Storage change events.
pub mod event;
/// Uncached store over a physical area.
pub mod local_storage;
/// Namespacing delegate.
pub mod prefixed;
/// Service wiring the process-wide stores.
pub mod service;

/// Physical areas for local storage.
pub mod local {
    /// In-memory area.
    pub mod in_memory;
    /// JSON-file backed area.
    pub mod json_file;
    /// SQLite-backed area.
    #[cfg(feature = "sqlite_local_store")]
    pub mod sqlite_store;
}

/// Uniform asynchronous key/value contract.
///
/// Reading a key that was never written, or the empty key, yields
/// `Ok(None)`. Removing a missing key is a no-op.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns every key/value pair in this store.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removes `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes everything in this store's scope.
    async fn clear(&self) -> Result<()>;
}

/// Shared handle to a store.
pub type StorageHandle = Arc<dyn Storage>;

/// Typed helpers on top of [`Storage`], going through plain JSON.
#[async_trait]
pub trait StorageExt: Storage {
    /// Reads `key` and deserializes it into `T`.
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.get(key).await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value.to_json())?)),
            None => Ok(None),
        }
    }

    /// Serializes `value` and stores it under `key`.
    async fn set_as<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let json = serde_json::to_value(value)?;
        self.set(key, Value::from_json(json)).await
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

pub use area::StorageArea;
pub use backend::memory::MemoryBackend;
pub use backend::remote::RemoteBackend;
pub use backend::{KeySelector, StorageBackend};
pub use cached::CachedStorage;
pub use event::{StorageEvent, StoreScope};
pub use local::in_memory::InMemoryArea;
pub use local::json_file::JsonFileArea;
#[cfg(feature = "sqlite_local_store")]
pub use local::sqlite_store::SqliteArea;
pub use local_storage::{clear_local_area, LocalStorage, RESERVED_PREFIX};
pub use prefixed::PrefixedStorage;
pub use service::{NotifyingStorage, StorageService, Subscription};
