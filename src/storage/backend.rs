//! Bulk backends, shaped like a browser extension's storage area.
//!
//! A backend stores already-encoded JSON values and works on several keys
//! per call. [`CachedStorage`](crate::storage::CachedStorage) layers the
//! codec and an in-memory cache on top.
use async_trait::async_trait;
use serde_json::{Map, Value as Json};

use crate::errors::Result;

/// In-memory backend.
pub mod memory;
/// HTTP key/value service backend.
pub mod remote;

/// Which keys a bulk read should return.
#[derive(Debug, Clone, Copy)]
pub enum KeySelector<'a> {
    All,
    Keys(&'a [String]),
}

impl KeySelector<'_> {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeySelector::All => true,
            KeySelector::Keys(keys) => keys.iter().any(|k| k == key),
        }
    }
}

/// Object-safe bulk key/value backend holding encoded values.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the selected entries. Unknown keys are left out of the result.
    async fn get(&self, keys: KeySelector<'_>) -> Result<Map<String, Json>>;

    /// Merges `items` into the stored state.
    async fn set(&self, items: Map<String, Json>) -> Result<()>;

    /// Removes `keys`; unknown keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Removes everything.
    async fn clear(&self) -> Result<()>;
}
