//! Metadata key-value store.
//!
//! A sorted KV interface with a sled-backed implementation. Index
//! descriptors live under `index/<name>`, opaque values under `kv/<key>`.

use std::path::Path;

use crate::error::{GalenaError, Result};

/// Key prefix for persisted index descriptors.
pub const INDEX_PREFIX: &str = "index/";
/// Key prefix for opaque byte values.
pub const KV_PREFIX: &str = "kv/";

/// Sorted key-value storage for engine metadata.
pub trait MetaStore: Send + Sync {
    /// Values of every key starting with `prefix`, in key order.
    fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Sled-backed metadata store.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) the store under `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            GalenaError::storage(format!(
                "open metadata store at {} failed: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(SledStore { db })
    }
}

impl MetaStore for SledStore {
    fn list(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(|e| GalenaError::storage(e.to_string()))?;
            out.push(value.to_vec());
        }
        Ok(out)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map(|v| v.map(|ivec| ivec.to_vec()))
            .map_err(|e| GalenaError::storage(e.to_string()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(GalenaError::storage("metadata key is empty"));
        }
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| GalenaError::storage(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(GalenaError::storage("metadata key is empty"));
        }
        self.db
            .remove(key.as_bytes())
            .map_err(|e| GalenaError::storage(e.to_string()))?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| GalenaError::storage(e.to_string()))?;
        Ok(())
    }
}

/// Key for one index descriptor.
pub fn index_key(name: &str) -> String {
    format!("{INDEX_PREFIX}{name}")
}

/// Key for one opaque value.
pub fn kv_key(name: &str) -> String {
    format!("{KV_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_set_get_delete() {
        let (_dir, store) = store();
        store.set("kv/instance_id", b"abc").unwrap();

        assert_eq!(store.get("kv/instance_id").unwrap().unwrap(), b"abc");
        store.delete("kv/instance_id").unwrap();
        assert!(store.get("kv/instance_id").unwrap().is_none());
    }

    #[test]
    fn test_list_by_prefix_in_key_order() {
        let (_dir, store) = store();
        store.set("index/b", b"2").unwrap();
        store.set("index/a", b"1").unwrap();
        store.set("kv/x", b"3").unwrap();

        let values = store.list(INDEX_PREFIX).unwrap();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_empty_key_rejected() {
        let (_dir, store) = store();
        assert!(store.set("", b"x").is_err());
        assert!(store.delete("").is_err());
    }
}
