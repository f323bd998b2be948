//! Shard writer: owns the segment, persists it to the shard directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GalenaError, Result};
use crate::index::field::Document;
use crate::index::reader::IndexReader;
use crate::index::segment::Segment;

const SEGMENT_FILE: &str = "segment.json";

/// Writer for a single shard directory.
///
/// All mutation goes through the interior write lock, serializing writes to
/// the shard. Readers are copy-on-write snapshots: opening one is an Arc
/// clone, and a subsequent write clones the segment only while snapshots
/// are still alive.
pub struct IndexWriter {
    path: PathBuf,
    segment: RwLock<Arc<Segment>>,
}

impl IndexWriter {
    /// Open (or create) the shard directory and load any persisted segment.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let segment_file = path.join(SEGMENT_FILE);
        let segment = if segment_file.exists() {
            let bytes = fs::read(&segment_file)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                GalenaError::storage(format!(
                    "segment file {} is unreadable: {e}",
                    segment_file.display()
                ))
            })?
        } else {
            Segment::new()
        };

        Ok(IndexWriter {
            path,
            segment: RwLock::new(Arc::new(segment)),
        })
    }

    /// Insert or replace a document by id.
    pub fn update(&self, doc: Document) -> Result<()> {
        let mut guard = self.segment.write();
        Arc::make_mut(&mut guard).insert(doc);
        Ok(())
    }

    /// Delete a document by id. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut guard = self.segment.write();
        Ok(Arc::make_mut(&mut guard).delete(id))
    }

    /// Persist the segment to disk (write-then-rename).
    pub fn commit(&self) -> Result<()> {
        let snapshot = self.segment.read().clone();
        let bytes = serde_json::to_vec(&*snapshot)?;

        let tmp = self.path.join(format!("{SEGMENT_FILE}.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, self.path.join(SEGMENT_FILE))?;
        Ok(())
    }

    /// Bytes used by the shard directory on disk.
    pub fn disk_size(&self) -> u64 {
        fn dir_size(path: &Path) -> u64 {
            fs::read_dir(path)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|entry| match entry.metadata() {
                            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
                            Ok(meta) => meta.len(),
                            Err(_) => 0,
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        dir_size(&self.path)
    }

    /// Open a point-in-time reader over the current segment.
    pub fn reader(&self) -> IndexReader {
        IndexReader::new(self.segment.read().clone())
    }

    /// Live documents currently in the segment.
    pub fn doc_count(&self) -> u32 {
        self.segment.read().live_docs()
    }

    /// Flush and release. The writer is unusable afterwards only by
    /// convention; dropping it releases the segment.
    pub fn close(&self) -> Result<()> {
        self.commit()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
