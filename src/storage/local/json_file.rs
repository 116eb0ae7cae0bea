//! JSON-file backed area.
//!
//! `JsonFileArea` keeps every item in one JSON object on disk. There is no
//! in-memory copy: each read loads the file and each write rewrites it, so
//! several processes pointed at the same file see each other's writes.
//!
//! Writes go to a temporary sibling first and are renamed into place. A
//! process-local lock serialises read-modify-write cycles within one
//! process; there is no cross-process locking.
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::errors::Result;
use crate::storage::area::{check_quota, entry_size, StorageArea};

type Items = BTreeMap<String, String>;

pub struct JsonFileArea {
    /// Path to the JSON file holding all items.
    path: PathBuf,
    quota: Option<usize>,
    write_lock: Mutex<()>,
}

impl JsonFileArea {
    /// Opens (or creates) an area stored at `path`.
    ///
    /// A missing file is created empty; parent directories must exist.
    pub fn open(path: impl Into<PathBuf>, quota: Option<usize>) -> Result<Self> {
        let area = Self {
            path: path.into(),
            quota,
            write_lock: Mutex::new(()),
        };

        if !area.path.exists() {
            area.save_file(&Items::new())?;
        }
        Ok(area)
    }

    /// Loads the file. An empty file reads as an empty area.
    fn load_file(&self) -> Result<Items> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Items::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Items::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_file(&self, items: &Items) -> Result<()> {
        let contents = serde_json::to_vec_pretty(items)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Runs `f` on the loaded items and saves the result.
    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Items) -> Result<()>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load_file()?;
        f(&mut items)?;
        self.save_file(&items)
    }
}

impl StorageArea for JsonFileArea {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_file()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let quota = self.quota;
        self.update(|items| {
            let usage = items.iter().map(|(k, v)| entry_size(k, v)).sum();
            let old = items.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
            check_quota(quota, usage, old, entry_size(key, value))?;

            items.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|items| {
            items.remove(key);
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save_file(&Items::new())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.load_file()?.len())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load_file()?.into_keys().collect())
    }
}
