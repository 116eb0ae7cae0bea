use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::{self, Value};
use crate::config::OPT_OUT_KEY;
use crate::errors::Result;
use crate::storage::area::StorageArea;
use crate::storage::Storage;

/// Keys starting with this are bookkeeping and hidden from `get_all`.
pub const RESERVED_PREFIX: &str = "_";

/// Store over a synchronous [`StorageArea`], without any caching.
///
/// Every call reads or writes the area, encoding values as JSON text. When
/// a write fails because the area is full, the whole area is wiped (except
/// for the preserved keys) and the write is tried once more.
pub struct LocalStorage {
    area: Arc<dyn StorageArea>,
    quota_recovery: bool,
    preserved_keys: Vec<String>,
}

impl LocalStorage {
    pub fn new(area: Arc<dyn StorageArea>) -> Self {
        Self {
            area,
            quota_recovery: true,
            preserved_keys: vec![OPT_OUT_KEY.to_string()],
        }
    }

    /// Turns the wipe-and-retry on a full area on or off.
    pub fn with_quota_recovery(mut self, enabled: bool) -> Self {
        self.quota_recovery = enabled;
        self
    }

    /// Keys kept across a quota wipe.
    pub fn preserving(mut self, keys: Vec<String>) -> Self {
        self.preserved_keys = keys;
        self
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        match self.area.get_item(key)? {
            Some(text) => Ok(Some(codec::decode(serde_json::from_str(&text)?))),
            None => Ok(None),
        }
    }
}

/// Clears `area` but keeps the values of `preserved` keys.
///
/// Every preserved key is written back even when an earlier one fails; the
/// first failure is returned afterwards.
pub fn clear_local_area(area: &dyn StorageArea, preserved: &[String]) -> Result<()> {
    let mut kept = Vec::new();
    for key in preserved {
        if let Some(value) = area.get_item(key)? {
            kept.push((key, value));
        }
    }

    area.clear()?;

    let mut first_err = None;
    for (key, value) in kept {
        if let Err(e) = area.set_item(key, &value) {
            log::error!("[Storage] Failed to restore {key} after clearing local storage: {e}");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        log::debug!("[Storage] Get All");
        let mut ret = HashMap::new();
        for key in self.area.keys()? {
            if key.starts_with(RESERVED_PREFIX) {
                continue;
            }
            if let Some(value) = self.read(&key)? {
                ret.insert(key, value);
            }
        }
        Ok(ret)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }

        log::debug!("[Storage] Get {key}");
        self.read(key)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        log::debug!("[Storage] Set {key}");
        let json = serde_json::to_string(&codec::encode(&value))?;

        match self.area.set_item(key, &json) {
            Err(e) if e.is_quota() && self.quota_recovery => {
                log::info!("[Storage] {e}, clearing local storage and retrying {key}");
                clear_local_area(self.area.as_ref(), &self.preserved_keys)?;
                self.area.set_item(key, &json)
            }
            other => other,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        log::debug!("[Storage] Remove {key}");
        self.area.remove_item(key)
    }

    async fn clear(&self) -> Result<()> {
        log::debug!("[Storage] Clear");
        self.area.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::storage::InMemoryArea;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Area whose first `failures` writes report a full area.
    struct FullOnceArea {
        inner: InMemoryArea,
        failures: AtomicUsize,
        clears: AtomicUsize,
    }

    impl FullOnceArea {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryArea::new(),
                failures: AtomicUsize::new(failures),
                clears: AtomicUsize::new(0),
            }
        }
    }

    impl StorageArea for FullOnceArea {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }
        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            // bookkeeping writes during the wipe always succeed
            if left > 0 && !key.starts_with(RESERVED_PREFIX) {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::QuotaExceeded { needed: 1, quota: 0 });
            }
            self.inner.set_item(key, value)
        }
        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
        fn clear(&self) -> Result<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.inner.clear()
        }
        fn len(&self) -> Result<usize> {
            self.inner.len()
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[tokio::test]
    async fn values_round_trip_through_area_text() {
        let area = Arc::new(InMemoryArea::new());
        let store = LocalStorage::new(area.clone());

        store.set("a", Value::Undefined).await.unwrap();
        assert_eq!(
            area.get_item("a").unwrap().as_deref(),
            Some(r#"{"__type":"undefined","value":null}"#)
        );
        assert_eq!(store.get("a").await.unwrap(), Some(Value::Undefined));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.get("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_all_skips_reserved_keys() {
        let area = Arc::new(InMemoryArea::new());
        area.set_item(OPT_OUT_KEY, "yes").unwrap();
        let store = LocalStorage::new(area);

        store.set("visible", Value::from(1)).await.unwrap();
        store.set("_hidden", Value::from(2)).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["visible"], Value::Int(1));
    }

    #[tokio::test]
    async fn quota_failure_wipes_once_and_retries() {
        let area = Arc::new(FullOnceArea::new(1));
        area.inner.set_item(OPT_OUT_KEY, "yes").unwrap();
        area.inner.set_item("stale", "1").unwrap();
        let store = LocalStorage::new(area.clone());

        store.set("k", Value::from("v")).await.unwrap();

        assert_eq!(area.clears.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("k").await.unwrap(), Some(Value::from("v")));
        assert_eq!(area.get_item(OPT_OUT_KEY).unwrap().as_deref(), Some("yes"));
        assert!(area.get_item("stale").unwrap().is_none());
    }

    #[tokio::test]
    async fn second_quota_failure_propagates() {
        let area = Arc::new(FullOnceArea::new(2));
        let store = LocalStorage::new(area.clone());

        let err = store.set("k", Value::from("v")).await.unwrap_err();
        assert!(err.is_quota());
        assert_eq!(area.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovery_can_be_disabled() {
        let area = Arc::new(FullOnceArea::new(1));
        area.inner.set_item("stale", "1").unwrap();
        let store = LocalStorage::new(area.clone()).with_quota_recovery(false);

        assert!(store.set("k", Value::from("v")).await.unwrap_err().is_quota());
        assert_eq!(area.clears.load(Ordering::SeqCst), 0);
        assert!(area.get_item("stale").unwrap().is_some());
    }

    #[tokio::test]
    async fn real_quota_makes_room_for_new_value() {
        let area = Arc::new(InMemoryArea::with_quota(64));
        area.set_item(OPT_OUT_KEY, "yes").unwrap();
        let store = LocalStorage::new(area.clone());

        store.set("old", Value::from("x".repeat(30))).await.unwrap();
        store.set("new", Value::from("y".repeat(30))).await.unwrap();

        assert!(area.get_item("old").unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
        assert_eq!(area.get_item(OPT_OUT_KEY).unwrap().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = LocalStorage::new(Arc::new(InMemoryArea::new()));
        store.set("k", Value::from(1)).await.unwrap();

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_text_is_an_error() {
        let area = Arc::new(InMemoryArea::new());
        area.set_item("k", "{oops").unwrap();
        let store = LocalStorage::new(area);

        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Serialization(_))
        ));
    }

    /// Area that refuses to write one key.
    struct RejectingArea {
        inner: InMemoryArea,
        rejected: &'static str,
    }

    impl StorageArea for RejectingArea {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }
        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if key == self.rejected {
                return Err(StorageError::Backend("disk full".into()));
            }
            self.inner.set_item(key, value)
        }
        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
        fn len(&self) -> Result<usize> {
            self.inner.len()
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn clear_local_area_restores_remaining_keys_after_a_failure() {
        let area = RejectingArea {
            inner: InMemoryArea::new(),
            rejected: "_first",
        };
        area.inner.set_item("_first", "1").unwrap();
        area.inner.set_item(OPT_OUT_KEY, "yes").unwrap();
        area.inner.set_item("other", "x").unwrap();

        let err = clear_local_area(&area, &["_first".to_string(), OPT_OUT_KEY.to_string()])
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(area.get_item(OPT_OUT_KEY).unwrap().as_deref(), Some("yes"));
        assert!(area.get_item("other").unwrap().is_none());
    }

    #[test]
    fn clear_local_area_keeps_only_preserved_keys() {
        let area = InMemoryArea::new();
        area.set_item("a", "1").unwrap();
        area.set_item("_sentry-opt-out", "yes").unwrap();

        clear_local_area(&area, &[OPT_OUT_KEY.to_string(), "absent".to_string()]).unwrap();
        assert_eq!(area.keys().unwrap(), vec![OPT_OUT_KEY.to_string()]);
    }
}
