//! One search index: mappings, analyzers, and an ordered list of shards.
//!
//! The newest shard is the sole write target. A shard retires when its
//! on-disk size exceeds the configured maximum; retired shards keep frozen
//! document-time bounds used to prune readers on time-windowed queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::analysis::registry::{build_analyzers, AnalysisConfig};
use crate::analysis::Analyzer;
use crate::config::{Config, StorageKind};
use crate::document;
use crate::dsl;
use crate::error::{GalenaError, Result};
use crate::index::reader::IndexReader;
use crate::index::writer::IndexWriter;
use crate::mapping::Mappings;
use crate::metadata::{self, MetaStore};
use crate::search::{self, DocumentList};

/// Advisory index settings plus the raw analysis config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub number_of_shards: Option<u32>,

    #[serde(default)]
    pub number_of_replicas: Option<u32>,

    /// Declarative analyzer configuration, kept verbatim so analyzers can
    /// be rebuilt at load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

/// Persisted per-shard attributes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShardMeta {
    pub id: u64,
    pub doc_time_min: i64,
    pub doc_time_max: i64,
}

/// The descriptor persisted at `index/<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub storage_type: StorageKind,
    #[serde(default)]
    pub settings: IndexSettings,
    #[serde(default)]
    pub mappings: Mappings,
    pub shards: Vec<ShardMeta>,
}

/// One shard: frozen/running time bounds and a lazily opened writer.
pub struct Shard {
    pub id: u64,
    doc_time_min: AtomicI64,
    doc_time_max: AtomicI64,
    writer: RwLock<Option<Arc<IndexWriter>>>,
}

impl Shard {
    fn new(meta: ShardMeta) -> Self {
        Shard {
            id: meta.id,
            doc_time_min: AtomicI64::new(meta.doc_time_min),
            doc_time_max: AtomicI64::new(meta.doc_time_max),
            writer: RwLock::new(None),
        }
    }

    pub fn doc_time_min(&self) -> i64 {
        self.doc_time_min.load(Ordering::Acquire)
    }

    pub fn doc_time_max(&self) -> i64 {
        self.doc_time_max.load(Ordering::Acquire)
    }

    fn meta(&self) -> ShardMeta {
        ShardMeta {
            id: self.id,
            doc_time_min: self.doc_time_min(),
            doc_time_max: self.doc_time_max(),
        }
    }
}

/// A live index.
pub struct Index {
    pub name: String,
    pub storage_kind: StorageKind,
    pub settings: IndexSettings,
    analyzers: HashMap<String, Arc<Analyzer>>,
    mappings: RwLock<Mappings>,
    shards: RwLock<Vec<Arc<Shard>>>,
    // Running bounds of the active shard, frozen into it on roll.
    doc_time_min: AtomicI64,
    doc_time_max: AtomicI64,
    config: Arc<Config>,
    meta: Arc<dyn MetaStore>,
    pool: Arc<rayon::ThreadPool>,
}

impl Index {
    /// Create a fresh index with a single empty shard and persist it.
    pub fn create(
        name: &str,
        storage_kind: StorageKind,
        settings: IndexSettings,
        mappings: Mappings,
        config: Arc<Config>,
        meta: Arc<dyn MetaStore>,
        pool: Arc<rayon::ThreadPool>,
    ) -> Result<Arc<Self>> {
        let descriptor = IndexDescriptor {
            name: name.to_string(),
            storage_type: storage_kind,
            settings,
            mappings,
            shards: vec![ShardMeta::default()],
        };
        let index = Self::from_descriptor(descriptor, config, meta, pool)?;
        index.store()?;
        Ok(index)
    }

    /// Rebuild an index from its persisted descriptor.
    pub fn from_descriptor(
        descriptor: IndexDescriptor,
        config: Arc<Config>,
        meta: Arc<dyn MetaStore>,
        pool: Arc<rayon::ThreadPool>,
    ) -> Result<Arc<Self>> {
        if descriptor.shards.is_empty() {
            return Err(GalenaError::runtime(format!(
                "index [{}] has no shards",
                descriptor.name
            )));
        }

        let analyzers = match &descriptor.settings.analysis {
            Some(raw) => {
                let parsed: AnalysisConfig = serde_json::from_value(raw.clone())
                    .map_err(|e| GalenaError::parsing(format!("[analysis] is invalid: {e}")))?;
                build_analyzers(&parsed)?
            }
            None => HashMap::new(),
        };

        let mut mappings = descriptor.mappings;
        mappings.ensure_timestamp();

        let shards = descriptor
            .shards
            .iter()
            .map(|meta| Arc::new(Shard::new(*meta)))
            .collect();

        Ok(Arc::new(Index {
            name: descriptor.name,
            storage_kind: descriptor.storage_type,
            settings: descriptor.settings,
            analyzers,
            mappings: RwLock::new(mappings),
            shards: RwLock::new(shards),
            doc_time_min: AtomicI64::new(0),
            doc_time_max: AtomicI64::new(0),
            config,
            meta,
            pool,
        }))
    }

    /// Snapshot of the persisted shape.
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            name: self.name.clone(),
            storage_type: self.storage_kind,
            settings: self.settings.clone(),
            mappings: self.mappings.read().clone(),
            shards: self.shards.read().iter().map(|s| s.meta()).collect(),
        }
    }

    /// Persist the descriptor via the metadata store.
    pub fn store(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.descriptor())?;
        self.meta.set(&metadata::index_key(&self.name), &bytes)
    }

    pub fn mappings(&self) -> Mappings {
        self.mappings.read().clone()
    }

    pub fn analyzers(&self) -> &HashMap<String, Arc<Analyzer>> {
        &self.analyzers
    }

    /// Merge and persist a mapping update. Type changes are rejected.
    pub fn set_mappings(&self, update: &Mappings) -> Result<()> {
        {
            let mut guard = self.mappings.write();
            guard.merge(update)?;
        }
        self.store()
    }

    /// Highest shard id; the active shard.
    pub fn latest_shard_id(&self) -> u64 {
        self.shards.read().last().expect("shards is non-empty").id
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().len()
    }

    /// Writer of the given shard (default: the active one), opened lazily
    /// with double-checked locking.
    pub fn get_writer(&self, shard_id: Option<u64>) -> Result<Arc<IndexWriter>> {
        let shard = {
            let shards = self.shards.read();
            let id = shard_id.unwrap_or_else(|| shards.last().expect("non-empty").id);
            shards
                .get(id as usize)
                .cloned()
                .ok_or_else(|| GalenaError::runtime(format!("shard [{id}] not found")))?
        };

        if let Some(writer) = shard.writer.read().clone() {
            return Ok(writer);
        }

        let mut guard = shard.writer.write();
        if let Some(writer) = guard.clone() {
            return Ok(writer);
        }

        if self.storage_kind == StorageKind::S3 {
            return Err(GalenaError::storage(
                "object-store backend is not configured for this build",
            ));
        }
        let writer = Arc::new(IndexWriter::open(
            self.config.shard_path(&self.name, shard.id),
        )?);
        *guard = Some(Arc::clone(&writer));
        Ok(writer)
    }

    /// Writers of every shard, oldest first.
    pub fn get_writers(&self) -> Result<Vec<Arc<IndexWriter>>> {
        let ids: Vec<u64> = self.shards.read().iter().map(|s| s.id).collect();
        ids.into_iter().map(|id| self.get_writer(Some(id))).collect()
    }

    /// Readers for every shard that can contain documents inside the query
    /// time window. Iterates newest to oldest; shards disjoint from the
    /// window are skipped, and iteration stops early once a shard's lower
    /// bound falls below the window.
    pub fn get_readers(&self, time_min: i64, time_max: i64) -> Result<Vec<IndexReader>> {
        let shards: Vec<Arc<Shard>> = self.shards.read().iter().rev().cloned().collect();

        let mut selected = Vec::new();
        for shard in shards {
            let shard_min = shard.doc_time_min();
            let shard_max = shard.doc_time_max();
            if (time_min > 0 && shard_max > 0 && shard_max < time_min)
                || (time_max > 0 && shard_min > 0 && shard_min > time_max)
            {
                continue;
            }
            selected.push(shard.id);
            // Older shards only hold older documents.
            if shard_min > 0 && shard_min < time_min {
                break;
            }
        }

        // Open in parallel, bounded by the shared pool.
        let (tx, rx) = crossbeam_channel::bounded(selected.len().max(1));
        let first_error: parking_lot::Mutex<Option<GalenaError>> = parking_lot::Mutex::new(None);
        self.pool.scope(|scope| {
            for id in &selected {
                let tx = tx.clone();
                let first_error = &first_error;
                let id = *id;
                scope.spawn(move |_| match self.get_writer(Some(id)) {
                    Ok(writer) => {
                        let _ = tx.send(writer.reader());
                    }
                    Err(e) => {
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                });
            }
            drop(tx);
        });

        if let Some(error) = first_error.lock().take() {
            return Err(error);
        }
        Ok(rx.into_iter().collect())
    }

    /// Build, write, and commit one document; persists any inferred mapping
    /// delta and rolls the active shard when it outgrows the size limit.
    pub fn write_document(&self, id: &str, source: &Value) -> Result<()> {
        let mappings_snapshot = self.mappings();
        let output = document::build(id, source, &mappings_snapshot, &self.analyzers)?;

        if !output.mapping_delta.is_empty() {
            self.set_mappings(&output.mapping_delta)?;
        }

        let writer = self.get_writer(None)?;
        writer.update(output.doc)?;
        writer.commit()?;

        self.observe_timestamp(output.timestamp);
        self.check_and_roll()
    }

    /// Delete a document wherever it lives, newest shard first.
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        for writer in self.get_writers()?.into_iter().rev() {
            if writer.delete(id)? {
                writer.commit()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Track running document-time bounds of the active shard.
    fn observe_timestamp(&self, millis: i64) {
        self.doc_time_max.fetch_max(millis, Ordering::AcqRel);
        // Zero means unset; the first observation seeds the minimum.
        let mut current = self.doc_time_min.load(Ordering::Acquire);
        loop {
            if current != 0 && current <= millis {
                break;
            }
            match self.doc_time_min.compare_exchange(
                current,
                millis,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Roll to a new shard if the active one exceeds the size limit.
    pub fn check_and_roll(&self) -> Result<()> {
        let writer = self.get_writer(None)?;
        if writer.disk_size() > self.config.shard_max_size {
            self.new_shard()?;
        }
        Ok(())
    }

    /// Freeze the active shard's time bounds and append the next shard.
    pub fn new_shard(&self) -> Result<()> {
        {
            let mut shards = self.shards.write();
            let active = shards.last().expect("shards is non-empty");
            info!(index = %self.name, shard = active.id, "roll to new shard");

            active
                .doc_time_min
                .store(self.doc_time_min.load(Ordering::Acquire), Ordering::Release);
            active
                .doc_time_max
                .store(self.doc_time_max.load(Ordering::Acquire), Ordering::Release);
            self.doc_time_min.store(0, Ordering::Release);
            self.doc_time_max.store(0, Ordering::Release);

            let next_id = active.id + 1;
            shards.push(Arc::new(Shard::new(ShardMeta {
                id: next_id,
                ..ShardMeta::default()
            })));
        }

        // A persistence failure leaves the in-memory shard usable; flag it
        // for recovery at next boot.
        if let Err(e) = self.store() {
            error!(index = %self.name, error = %e, "persisting descriptor after shard roll failed");
        }
        Ok(())
    }

    /// Run a search across the shards intersecting the query time window.
    pub fn search(&self, body: &Value, cancel: Arc<std::sync::atomic::AtomicBool>) -> Result<DocumentList> {
        let mappings = self.mappings();
        // One up-front translation validates the body and yields the
        // pruning window.
        let parsed = dsl::translate(body, &mappings, &self.analyzers, self.config.max_results)?;
        let (time_min, time_max) = dsl::time_range(&parsed.query);

        let readers = self.get_readers(time_min, time_max)?;
        search::multi_search(
            &self.pool,
            body,
            &mappings,
            &self.analyzers,
            readers,
            self.config.max_results,
            cancel,
        )
    }

    /// Total live documents across shards.
    pub fn doc_count(&self) -> Result<u64> {
        let mut total = 0u64;
        for writer in self.get_writers()? {
            total += writer.doc_count() as u64;
        }
        Ok(total)
    }

    /// Flush and close every open writer.
    pub fn close(&self) -> Result<()> {
        for shard in self.shards.read().iter() {
            if let Some(writer) = shard.writer.read().clone() {
                writer.close()?;
            }
        }
        Ok(())
    }
}
