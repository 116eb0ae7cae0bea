use std::collections::HashMap;

use async_trait::async_trait;

use crate::codec::Value;
use crate::errors::{Result, StorageError};
use crate::storage::{Storage, StorageHandle};

/// Namespace inside another store: every key is prefixed before it is
/// forwarded.
///
/// `clear` is forwarded as-is and empties the whole inner store, not just
/// this namespace. A namespace shares its parent's clear lifecycle.
///
/// `get_all` is refused with [`StorageError::Unsupported`].
pub struct PrefixedStorage {
    inner: StorageHandle,
    prefix: String,
}

impl PrefixedStorage {
    pub fn new(inner: StorageHandle, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(StorageError::InvalidPrefix);
        }
        Ok(Self { inner, prefix })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl Storage for PrefixedStorage {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        Err(StorageError::Unsupported("get_all on a prefixed store"))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }
        self.inner.get(&self.key(key)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.set(&self.key(key), value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(&self.key(key)).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}
