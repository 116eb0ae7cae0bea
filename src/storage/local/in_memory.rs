use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::Result;
use crate::storage::area::{check_quota, entry_size, StorageArea};

/// In‑memory area (no persistence). Used when no local area is configured,
/// and in tests.
#[derive(Default)]
pub struct InMemoryArea {
    map: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl InMemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// An area that refuses writes once keys and values together exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            map: Mutex::default(),
            quota: Some(bytes),
        }
    }

    /// Bytes currently counted against the quota.
    pub fn usage(&self) -> usize {
        self.lock().iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageArea for InMemoryArea {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.lock();
        let usage = map.iter().map(|(k, v)| entry_size(k, v)).sum();
        let old = map.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
        check_quota(self.quota, usage, old, entry_size(key, value))?;

        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock().len())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut v: Vec<String> = self.lock().keys().cloned().collect();
        v.sort_unstable();
        Ok(v)
    }
}
