//! Fan-out search executor: runs a parsed query concurrently across shard
//! readers and merges ranked results and aggregation buckets globally.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use serde_json::Value;

use crate::analysis::Analyzer;
use crate::dsl::{self, ParsedQuery};
use crate::error::{GalenaError, Result};
use crate::index::collector::{compare_matches, CollectorStore};
use crate::index::reader::{DocumentMatch, IndexReader};
use crate::mapping::Mappings;
use crate::search::aggregator::Bucket;
use crate::search::highlight;

/// Merged, completed search output.
#[derive(Debug)]
pub struct DocumentList {
    pub docs: Vec<DocumentMatch>,
    /// Total matches consumed across all readers.
    pub total: u64,
    /// Rendered `aggregations` response object, when requested.
    pub aggregations: Option<Value>,
    /// The translation the response is shaped by.
    pub parsed: ParsedQuery,
}

/// Execute a search body against a set of shard readers.
///
/// The query is translated once per reader; sort order, paging, and
/// aggregations are recorded from the first translation. With two or more
/// readers the shard searches run as bounded tasks feeding one consumer
/// that owns the global heap and the aggregation bucket.
pub fn multi_search(
    pool: &rayon::ThreadPool,
    body: &Value,
    mappings: &Mappings,
    analyzers: &HashMap<String, Arc<Analyzer>>,
    readers: Vec<IndexReader>,
    max_results: usize,
    cancel: Arc<AtomicBool>,
) -> Result<DocumentList> {
    let parsed = dsl::translate(body, mappings, analyzers, max_results)?;

    if readers.is_empty() {
        let bucket = Bucket::new(&parsed.aggs);
        return Ok(DocumentList {
            docs: Vec::new(),
            total: 0,
            aggregations: bucket.finalize(),
            parsed,
        });
    }

    if readers.len() == 1 {
        return single_search(&readers[0], parsed, &cancel);
    }

    let num_readers = readers.len();
    let backing = (parsed.size + parsed.from + 1) * num_readers;
    let (tx, rx) = bounded::<DocumentMatch>(num_readers * 10);

    let first_error: Arc<Mutex<Option<GalenaError>>> = Arc::new(Mutex::new(None));

    // Single consumer serializes heap updates and bucket consumption.
    let consumer = {
        let sort = parsed.sort.clone();
        let aggs = parsed.aggs.clone();
        std::thread::spawn(move || {
            let mut store = CollectorStore::new(sort.clone(), backing);
            let mut bucket = Bucket::new(&aggs);
            // Worst match already ejected from the heap; candidates that
            // cannot beat it skip all heap operations.
            let mut lowest_ejected: Option<DocumentMatch> = None;

            for doc in rx {
                bucket.consume(&doc);

                if let Some(lowest) = &lowest_ejected {
                    if compare_matches(&sort, &doc, lowest) != Ordering::Less {
                        continue;
                    }
                }
                if let Some(removed) = store.add_not_exceeding_size(doc) {
                    let replace = match &lowest_ejected {
                        None => true,
                        Some(lowest) => {
                            compare_matches(&sort, &removed, lowest) == Ordering::Less
                        }
                    };
                    if replace {
                        lowest_ejected = Some(removed);
                    }
                }
            }
            (store, bucket)
        })
    };

    // Translate per reader; parse state is never shared between workers.
    let mut requests = Vec::with_capacity(num_readers);
    for _ in 0..num_readers {
        requests.push(dsl::translate(body, mappings, analyzers, max_results)?);
    }

    pool.scope(|scope| {
        for (reader, request) in readers.iter().zip(requests.into_iter()) {
            let tx = tx.clone();
            let cancel = Arc::clone(&cancel);
            let first_error = Arc::clone(&first_error);
            scope.spawn(move |_| {
                if cancel.load(AtomicOrdering::Relaxed) {
                    return;
                }
                match reader.matches(&request.query, &request.sort) {
                    Ok(matches) => {
                        for doc in matches {
                            if cancel.load(AtomicOrdering::Relaxed) {
                                return;
                            }
                            if tx.send(doc).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        // First failure wins and cancels the siblings.
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        cancel.store(true, AtomicOrdering::Relaxed);
                    }
                }
            });
        }
        drop(tx);
    });

    let (store, bucket) = consumer
        .join()
        .map_err(|_| GalenaError::runtime("search consumer panicked"))?;

    if let Some(error) = first_error.lock().take() {
        return Err(error);
    }
    if cancel.load(AtomicOrdering::Relaxed) {
        return Err(GalenaError::cancelled("search was cancelled"));
    }

    let total = bucket.count();
    let aggregations = bucket.finalize();
    let mut docs = store.into_sorted();
    if parsed.reversed {
        docs.reverse();
    }
    finish(&mut docs, &parsed);

    Ok(DocumentList {
        docs,
        total,
        aggregations,
        parsed,
    })
}

/// One reader: no fan-out, no merging.
fn single_search(
    reader: &IndexReader,
    parsed: ParsedQuery,
    cancel: &AtomicBool,
) -> Result<DocumentList> {
    if cancel.load(AtomicOrdering::Relaxed) {
        return Err(GalenaError::cancelled("search was cancelled"));
    }

    let matches = reader.matches(&parsed.query, &parsed.sort)?;
    let mut bucket = Bucket::new(&parsed.aggs);
    let mut store = CollectorStore::new(parsed.sort.clone(), parsed.size + parsed.from + 1);

    for doc in matches {
        bucket.consume(&doc);
        store.add_not_exceeding_size(doc);
    }

    let total = bucket.count();
    let aggregations = bucket.finalize();
    let mut docs = store.into_sorted();
    if parsed.reversed {
        docs.reverse();
    }
    finish(&mut docs, &parsed);

    Ok(DocumentList {
        docs,
        total,
        aggregations,
        parsed,
    })
}

/// Apply skip and size, then run each survivor's completion hook.
fn finish(docs: &mut Vec<DocumentMatch>, parsed: &ParsedQuery) {
    if parsed.from > 0 {
        docs.drain(..parsed.from.min(docs.len()));
    }
    docs.truncate(parsed.size);
    for doc in docs.iter_mut() {
        doc.complete();
        if let Some(spec) = &parsed.highlight {
            highlight::apply(spec, &parsed.query, doc);
        }
    }
}
