use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value as Json};

use crate::errors::Result;
use crate::storage::backend::{KeySelector, StorageBackend};

/// In-process bulk backend. Nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    items: Mutex<Map<String, Json>>,
    loads: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that starts out holding `items`.
    pub fn with_items(items: Map<String, Json>) -> Self {
        Self {
            items: Mutex::new(items),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of `get` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Copy of the raw, encoded contents.
    pub fn snapshot(&self) -> Map<String, Json> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Json>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, keys: KeySelector<'_>) -> Result<Map<String, Json>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let selected = self
            .lock()
            .iter()
            .filter(|(k, _)| keys.matches(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(selected)
    }

    async fn set(&self, items: Map<String, Json>) -> Result<()> {
        self.lock().extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut items = self.lock();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}
