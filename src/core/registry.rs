//! Process-wide registry of live indexes, rebuilt from the metadata store
//! at startup.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, StorageKind};
use crate::core::index::{Index, IndexDescriptor, IndexSettings};
use crate::error::{GalenaError, Result};
use crate::mapping::Mappings;
use crate::metadata::{self, MetaStore, SledStore, INDEX_PREFIX};

/// Owner of every live index plus the metadata store and the shared search
/// pool. Created once at boot and passed explicitly to handlers.
pub struct Registry {
    config: Arc<Config>,
    meta: Arc<dyn MetaStore>,
    indexes: RwLock<HashMap<String, Arc<Index>>>,
    pool: Arc<rayon::ThreadPool>,
}

impl Registry {
    /// Open the metadata store, bootstrap the instance id, and reload every
    /// persisted index.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_path)?;
        let meta: Arc<dyn MetaStore> = Arc::new(SledStore::open(config.metadata_path())?);
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.read_thread_num)
                .thread_name(|i| format!("galena-search-{i}"))
                .build()
                .map_err(|e| GalenaError::runtime(format!("search pool creation failed: {e}")))?,
        );

        let registry = Registry {
            config: Arc::new(config),
            meta,
            indexes: RwLock::new(HashMap::new()),
            pool,
        };
        registry.bootstrap_instance_id()?;
        registry.load_all()?;
        Ok(registry)
    }

    fn bootstrap_instance_id(&self) -> Result<()> {
        let key = metadata::kv_key("instance_id");
        if self.meta.get(&key)?.is_none() {
            let id = Uuid::new_v4().simple().to_string();
            self.meta.set(&key, id.as_bytes())?;
            info!(instance_id = %id, "generated instance id");
        }
        Ok(())
    }

    /// Rebuild the in-memory registry from persisted descriptors.
    pub fn load_all(&self) -> Result<()> {
        let mut loaded = HashMap::new();
        for bytes in self.meta.list(INDEX_PREFIX)? {
            let descriptor: IndexDescriptor = match serde_json::from_slice(&bytes) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable index descriptor");
                    continue;
                }
            };
            let name = descriptor.name.clone();
            let index = Index::from_descriptor(
                descriptor,
                Arc::clone(&self.config),
                Arc::clone(&self.meta),
                Arc::clone(&self.pool),
            )?;
            loaded.insert(name, index);
        }

        info!(count = loaded.len(), "loaded indexes");
        *self.indexes.write() = loaded;
        Ok(())
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn get(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes.read().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    /// Names of all user indexes, sorted.
    pub fn list(&self) -> Vec<IndexDescriptor> {
        let mut descriptors: Vec<IndexDescriptor> = self
            .indexes
            .read()
            .values()
            .filter(|index| !index.name.starts_with('_'))
            .map(|index| index.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Create and register a new index; fails if the name is taken.
    pub fn create_index(
        &self,
        name: &str,
        storage_kind: StorageKind,
        settings: IndexSettings,
        mappings: Mappings,
    ) -> Result<Arc<Index>> {
        if name.is_empty() {
            return Err(GalenaError::parsing("index name is required"));
        }
        if name.starts_with('_') {
            return Err(GalenaError::parsing(format!(
                "index name [{name}] is reserved"
            )));
        }

        let mut indexes = self.indexes.write();
        if indexes.contains_key(name) {
            return Err(GalenaError::parsing(format!(
                "index [{name}] already exists"
            )));
        }

        let index = Index::create(
            name,
            storage_kind,
            settings,
            mappings,
            Arc::clone(&self.config),
            Arc::clone(&self.meta),
            Arc::clone(&self.pool),
        )?;
        indexes.insert(name.to_string(), Arc::clone(&index));
        info!(index = %name, storage = storage_kind.as_str(), "created index");
        Ok(index)
    }

    /// Fetch an index, creating it on first reference.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Index>> {
        if let Some(index) = self.get(name) {
            return Ok(index);
        }
        self.create_index(
            name,
            self.config.storage,
            IndexSettings::default(),
            Mappings::new(),
        )
    }

    /// Close an index, unlink its shard directories, and erase its
    /// descriptor.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        let index = self
            .indexes
            .write()
            .remove(name)
            .ok_or_else(|| GalenaError::not_found(format!("index {name} does not exist")))?;

        index.close()?;
        let path = self.config.index_path(name);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        self.meta.delete(&metadata::index_key(name))?;
        info!(index = %name, "deleted index");
        Ok(())
    }

    /// Resolve a search target: exact name, `*` wildcard pattern, or empty
    /// for every user index. System indexes never match a pattern.
    pub fn resolve_targets(&self, target: &str) -> Vec<Arc<Index>> {
        let indexes = self.indexes.read();
        if target.is_empty() || target == "*" || target == "_all" {
            let mut all: Vec<Arc<Index>> = indexes
                .values()
                .filter(|index| !index.name.starts_with('_'))
                .cloned()
                .collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            return all;
        }

        if target.contains('*') {
            let mut matched: Vec<Arc<Index>> = indexes
                .values()
                .filter(|index| !index.name.starts_with('_'))
                .filter(|index| glob_match(target, &index.name))
                .cloned()
                .collect();
            matched.sort_by(|a, b| a.name.cmp(&b.name));
            return matched;
        }

        indexes.get(target).cloned().into_iter().collect()
    }

    /// Close every index, then the metadata store. Readers are released by
    /// drop, writers flush first, the store closes last.
    pub fn close_all(&self) -> Result<()> {
        for (_, index) in self.indexes.write().drain() {
            index.close()?;
        }
        self.meta.close()
    }
}

/// Minimal `*` glob matching over index names.
fn glob_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    let first = parts[0];
    if !first.is_empty() {
        match rest.strip_prefix(first) {
            Some(r) => rest = r,
            None => return false,
        }
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    last.is_empty() || rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        let registry = Registry::open(config).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_create_get_delete() {
        let (_dir, registry) = registry();
        registry
            .create_index(
                "games",
                StorageKind::Disk,
                IndexSettings::default(),
                Mappings::new(),
            )
            .unwrap();

        assert!(registry.exists("games"));
        assert!(registry
            .create_index(
                "games",
                StorageKind::Disk,
                IndexSettings::default(),
                Mappings::new()
            )
            .is_err());

        registry.delete_index("games").unwrap();
        assert!(!registry.exists("games"));
        assert!(matches!(
            registry.delete_index("games").unwrap_err(),
            GalenaError::NotFound(_)
        ));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let (_dir, registry) = registry();
        assert!(registry
            .create_index(
                "_system",
                StorageKind::Disk,
                IndexSettings::default(),
                Mappings::new()
            )
            .is_err());
    }

    #[test]
    fn test_load_all_restores_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };

        {
            let registry = Registry::open(config.clone()).unwrap();
            let index = registry.get_or_create("games").unwrap();
            index
                .write_document("1", &json!({"City": "Turin"}))
                .unwrap();
            registry.close_all().unwrap();
        }

        let registry = Registry::open(config).unwrap();
        let index = registry.get("games").unwrap();
        assert_eq!(index.doc_count().unwrap(), 1);

        let out = index
            .search(
                &json!({"query": {"term": {"City": "turin"}}}),
                Arc::new(AtomicBool::new(false)),
            )
            .unwrap();
        assert_eq!(out.total, 1);
    }

    #[test]
    fn test_resolve_targets_wildcards() {
        let (_dir, registry) = registry();
        registry.get_or_create("logs-2022").unwrap();
        registry.get_or_create("logs-2023").unwrap();
        registry.get_or_create("games").unwrap();

        let names = |indexes: Vec<Arc<Index>>| -> Vec<String> {
            indexes.into_iter().map(|i| i.name.clone()).collect()
        };

        assert_eq!(
            names(registry.resolve_targets("logs-*")),
            vec!["logs-2022", "logs-2023"]
        );
        assert_eq!(names(registry.resolve_targets("")).len(), 3);
        assert_eq!(names(registry.resolve_targets("games")), vec!["games"]);
        assert!(registry.resolve_targets("nope").is_empty());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("logs-*", "logs-2022"));
        assert!(glob_match("*-2022", "logs-2022"));
        assert!(glob_match("l*2", "logs-2022"));
        assert!(!glob_match("logs-*", "games"));
        assert!(!glob_match("l*9", "logs-2022"));
    }
}
