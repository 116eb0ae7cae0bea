use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::{Result, StorageError};
use crate::storage::area::{check_quota, entry_size, StorageArea};

/// SQLite-based area, one row per item.
pub struct SqliteArea {
    pool: Pool<SqliteConnectionManager>,
    quota: Option<usize>,
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl SqliteArea {
    /// Creates a new SQLite area with the specified database file path.
    pub fn open(path: &str, quota: Option<usize>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(|c| {
                c.busy_timeout(std::time::Duration::from_millis(500))?;
                c.pragma_update(None, "journal_mode", "WAL")?;
                c.execute_batch(
                    "CREATE TABLE IF NOT EXISTS local_storage (
                        key TEXT NOT NULL PRIMARY KEY,
                        value TEXT NOT NULL,
                        updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
                    );",
                )?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)
            .map_err(backend_err)?;

        Ok(Self { pool, quota })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(backend_err)
    }
}

impl StorageArea for SqliteArea {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM local_storage WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(backend_err)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(backend_err)?;

        if self.quota.is_some() {
            let usage: i64 = tx
                .query_row(
                    "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                     FROM local_storage",
                    [],
                    |row| row.get(0),
                )
                .map_err(backend_err)?;
            let old = tx
                .query_row(
                    "SELECT value FROM local_storage WHERE key=?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(backend_err)?
                .map(|v| entry_size(key, &v))
                .unwrap_or(0);

            check_quota(self.quota, usage.max(0) as usize, old, entry_size(key, value))?;
        }

        tx.execute(
            "INSERT INTO local_storage(key,value) VALUES (?1,?2)
             ON CONFLICT(key) DO UPDATE
             SET value=excluded.value, updated_at=strftime('%s','now')",
            params![key, value],
        )
        .map_err(backend_err)?;
        tx.commit().map_err(backend_err)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM local_storage WHERE key=?1", params![key])
            .map_err(backend_err)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM local_storage", [])
            .map_err(backend_err)?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn
            .query_row::<i64, _, _>("SELECT COUNT(*) FROM local_storage", [], |row| row.get(0))
            .map_err(backend_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM local_storage ORDER BY key")
            .map_err(backend_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(backend_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(backend_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_area(quota: Option<usize>) -> (tempfile::TempDir, SqliteArea) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");
        let area = SqliteArea::open(path.to_str().unwrap(), quota).unwrap();
        (dir, area)
    }

    #[test]
    fn area_contract() {
        let (_dir, area) = temp_area(None);

        assert_eq!(area.len().unwrap(), 0);
        assert!(area.get_item("missing").unwrap().is_none());

        area.set_item("a", "1").unwrap();
        area.set_item("b", "2").unwrap();
        area.set_item("a", "ONE").unwrap();
        assert_eq!(area.len().unwrap(), 2);
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("ONE"));
        assert_eq!(area.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        area.remove_item("b").unwrap();
        area.remove_item("b").unwrap();
        assert_eq!(area.len().unwrap(), 1);

        area.clear().unwrap();
        assert!(area.is_empty().unwrap());
    }

    #[test]
    fn quota_is_enforced_in_bytes() {
        let (_dir, area) = temp_area(Some(6));

        area.set_item("ab", "cd").unwrap();
        assert!(area.set_item("ef", "gh").unwrap_err().is_quota());
        assert!(area.get_item("ef").unwrap().is_none());

        // overwrite replaces the old entry's share
        area.set_item("ab", "cdef").unwrap();
    }

    #[test]
    fn data_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let path = path.to_str().unwrap();

        SqliteArea::open(path, None).unwrap().set_item("k", "v").unwrap();
        let reopened = SqliteArea::open(path, None).unwrap();
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
