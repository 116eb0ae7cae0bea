use crate::errors::{Result, StorageError};

/// Object-safe, synchronous key/value area (DOM's `Storage`).
///
/// Values are opaque strings. Implementations may enforce a byte quota and
/// must report a full area as [`StorageError::QuotaExceeded`] so callers can
/// tell it apart from other failures.
pub trait StorageArea: Send + Sync {
    /// Retrieves the value associated with the given key, or `None` if not found.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Sets the value for the given key, overwriting any existing value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the item with the given key.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Clears all items in the storage area.
    fn clear(&self) -> Result<()>;

    /// Returns the number of items in the storage area.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns all keys in the storage area, sorted.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Bytes an entry occupies when counted against a quota.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Checks that replacing an entry of `old` bytes with one of `new` bytes
/// keeps `usage` within `quota`.
pub(crate) fn check_quota(quota: Option<usize>, usage: usize, old: usize, new: usize) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let needed = usage.saturating_sub(old) + new;
    if needed > quota {
        return Err(StorageError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryArea;

    #[test]
    fn storagearea_basic_contract() {
        let area = InMemoryArea::new();

        // starts empty
        assert!(area.is_empty().unwrap());
        assert!(area.get_item("missing").unwrap().is_none());

        // set + get
        area.set_item("a", "1").unwrap();
        area.set_item("b", "2").unwrap();
        assert_eq!(area.len().unwrap(), 2);
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("1"));

        // overwrite keeps len()
        area.set_item("a", "ONE").unwrap();
        assert_eq!(area.len().unwrap(), 2);
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("ONE"));

        // remove, twice
        area.remove_item("b").unwrap();
        area.remove_item("b").unwrap();
        assert_eq!(area.keys().unwrap(), vec!["a".to_string()]);

        // clear
        area.clear().unwrap();
        assert!(area.is_empty().unwrap());
    }

    #[test]
    fn quota_counts_replaced_entry_once() {
        assert!(check_quota(Some(10), 8, 4, 6).is_ok());
        assert!(check_quota(None, usize::MAX, 0, 100).is_ok());

        match check_quota(Some(10), 8, 0, 3) {
            Err(StorageError::QuotaExceeded { needed, quota }) => {
                assert_eq!(needed, 11);
                assert_eq!(quota, 10);
            }
            other => panic!("expected quota error, got {other:?}"),
        }
    }
}
