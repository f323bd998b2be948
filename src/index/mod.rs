//! Embedded inverted-index primitive: typed fields, a per-shard segment with
//! postings and doc values, a writer/reader pair, and a primitive query tree
//! with BM25 scoring.
//!
//! This layer knows nothing about the query DSL or shard management; it
//! indexes [`Document`]s and evaluates [`IndexQuery`] trees.

pub mod collector;
pub mod field;
pub mod query;
pub mod reader;
pub mod segment;
pub mod writer;

pub use collector::{compare_matches, CollectorStore, SortBy, SortOrder, SortSpec, SortValue};
pub use field::{Document, Field, FieldValue};
pub use query::{GeoPoint, IndexQuery};
pub use reader::{DocumentMatch, IndexReader};
pub use segment::{DocValue, PostingList, Segment, StoredDoc};
pub use writer::IndexWriter;
