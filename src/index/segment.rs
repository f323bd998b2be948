//! In-memory segment: postings, doc values, and stored fields for one shard.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::index::field::{Document, FieldValue};

/// Reserved field indexing the document id as an exact term.
pub const ID_FIELD: &str = "_id";

/// A doc value used for sorting, ranges, and aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocValue {
    Str(String),
    Num(f64),
    Time(i64),
}

impl DocValue {
    /// Numeric view of the value, if it has one. Time values expose their
    /// epoch millis.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DocValue::Num(n) => Some(*n),
            DocValue::Time(t) => Some(*t as f64),
            DocValue::Str(_) => None,
        }
    }

    /// String view used by terms aggregations and keyword sorting.
    pub fn to_display(&self) -> String {
        match self {
            DocValue::Str(s) => s.clone(),
            DocValue::Num(n) => format_number(*n),
            DocValue::Time(t) => t.to_string(),
        }
    }
}

/// Canonical term string for a numeric value: integers print without a
/// fractional part so `2006.0` indexes as `"2006"`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Posting list for one term of one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingList {
    pub docs: Vec<u32>,
    pub freqs: Vec<u32>,
    pub positions: Vec<Vec<u32>>,
}

impl PostingList {
    fn add(&mut self, doc: u32, positions: Vec<u32>) {
        self.freqs.push(positions.len() as u32);
        self.docs.push(doc);
        self.positions.push(positions);
    }
}

/// Per-document record: doc values, stored bytes, and field lengths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredDoc {
    pub id: String,
    pub deleted: bool,
    pub values: HashMap<String, Vec<DocValue>>,
    pub stored: HashMap<String, Vec<u8>>,
    pub lens: HashMap<String, u32>,
}

/// One shard's worth of indexed documents.
///
/// Terms per field live in a `BTreeMap` so prefix and range scans walk the
/// dictionary in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    pub docs: Vec<StoredDoc>,
    pub postings: HashMap<String, BTreeMap<String, PostingList>>,
    pub doc_ids: HashMap<String, u32>,
    /// Per-field total token length, for BM25 length normalization.
    pub field_lens: HashMap<String, u64>,
    live: u32,
}

impl Segment {
    pub fn new() -> Self {
        Segment::default()
    }

    /// Number of live (non-deleted) documents.
    pub fn live_docs(&self) -> u32 {
        self.live
    }

    pub fn doc(&self, ord: u32) -> Option<&StoredDoc> {
        self.docs.get(ord as usize).filter(|d| !d.deleted)
    }

    pub fn posting(&self, field: &str, term: &str) -> Option<&PostingList> {
        self.postings.get(field)?.get(term)
    }

    pub fn terms(&self, field: &str) -> Option<&BTreeMap<String, PostingList>> {
        self.postings.get(field)
    }

    /// Average token length of a field across live docs, for BM25.
    pub fn avg_field_len(&self, field: &str) -> f64 {
        let total = *self.field_lens.get(field).unwrap_or(&0);
        if self.live == 0 {
            0.0
        } else {
            total as f64 / self.live as f64
        }
    }

    /// Insert a typed document, replacing any existing document with the
    /// same id. Returns the new ordinal.
    pub fn insert(&mut self, doc: Document) -> u32 {
        self.delete(&doc.id);

        let ord = self.docs.len() as u32;
        let mut record = StoredDoc {
            id: doc.id.clone(),
            ..StoredDoc::default()
        };

        for field in doc.fields {
            match field.value {
                FieldValue::Text { raw, tokens } => {
                    let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
                    for token in &tokens {
                        positions
                            .entry(token.text.clone())
                            .or_default()
                            .push(token.position as u32);
                    }
                    for (term, pos) in positions {
                        self.postings
                            .entry(field.name.clone())
                            .or_default()
                            .entry(term)
                            .or_default()
                            .add(ord, pos);
                    }
                    record
                        .lens
                        .insert(field.name.clone(), tokens.len() as u32);
                    *self.field_lens.entry(field.name.clone()).or_default() +=
                        tokens.len() as u64;
                    record
                        .values
                        .entry(field.name.clone())
                        .or_default()
                        .push(DocValue::Str(raw.clone()));
                    if field.store {
                        record.stored.insert(field.name.clone(), raw.into_bytes());
                    }
                }
                FieldValue::Keyword(value) => {
                    self.postings
                        .entry(field.name.clone())
                        .or_default()
                        .entry(value.clone())
                        .or_default()
                        .add(ord, vec![0]);
                    record.lens.insert(field.name.clone(), 1);
                    *self.field_lens.entry(field.name.clone()).or_default() += 1;
                    record
                        .values
                        .entry(field.name.clone())
                        .or_default()
                        .push(DocValue::Str(value.clone()));
                    if field.store {
                        record.stored.insert(field.name.clone(), value.into_bytes());
                    }
                }
                FieldValue::Numeric(value) => {
                    let term = format_number(value);
                    self.postings
                        .entry(field.name.clone())
                        .or_default()
                        .entry(term)
                        .or_default()
                        .add(ord, vec![0]);
                    record
                        .values
                        .entry(field.name.clone())
                        .or_default()
                        .push(DocValue::Num(value));
                    if field.store {
                        record
                            .stored
                            .insert(field.name.clone(), format_number(value).into_bytes());
                    }
                }
                FieldValue::Time(millis) => {
                    record
                        .values
                        .entry(field.name.clone())
                        .or_default()
                        .push(DocValue::Time(millis));
                    if field.store {
                        record
                            .stored
                            .insert(field.name.clone(), millis.to_string().into_bytes());
                    }
                }
                FieldValue::Stored(bytes) => {
                    record.stored.insert(field.name.clone(), bytes);
                }
            }
        }

        // The document id is itself an exact term.
        self.postings
            .entry(ID_FIELD.to_string())
            .or_default()
            .entry(doc.id.clone())
            .or_default()
            .add(ord, vec![0]);
        record
            .values
            .entry(ID_FIELD.to_string())
            .or_default()
            .push(DocValue::Str(doc.id.clone()));

        self.doc_ids.insert(doc.id, ord);
        self.docs.push(record);
        self.live += 1;
        ord
    }

    /// Tombstone a document by id. Postings keep the ordinal; readers skip
    /// deleted docs at evaluation time.
    pub fn delete(&mut self, id: &str) -> bool {
        if let Some(ord) = self.doc_ids.remove(id) {
            let record = &mut self.docs[ord as usize];
            if !record.deleted {
                record.deleted = true;
                for (field, len) in &record.lens {
                    if let Some(total) = self.field_lens.get_mut(field) {
                        *total = total.saturating_sub(*len as u64);
                    }
                }
                self.live -= 1;
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::index::field::Field;

    fn doc(id: &str, title: &str) -> Document {
        let analyzer = Analyzer::standard();
        let mut doc = Document::new(id);
        doc.add_field(Field::text("title", title, &analyzer).unwrap());
        doc
    }

    #[test]
    fn test_insert_builds_postings() {
        let mut segment = Segment::new();
        segment.insert(doc("1", "hello world"));
        segment.insert(doc("2", "hello again"));

        let posting = segment.posting("title", "hello").unwrap();
        assert_eq!(posting.docs, vec![0, 1]);
        assert_eq!(segment.live_docs(), 2);
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let mut segment = Segment::new();
        segment.insert(doc("1", "old text"));
        segment.insert(doc("1", "new text"));

        assert_eq!(segment.live_docs(), 1);
        let ord = segment.doc_ids["1"];
        assert_eq!(segment.doc(ord).unwrap().id, "1");
        assert!(segment.posting("title", "new").is_some());
    }

    #[test]
    fn test_delete_tombstones() {
        let mut segment = Segment::new();
        segment.insert(doc("1", "hello"));

        assert!(segment.delete("1"));
        assert_eq!(segment.live_docs(), 0);
        assert!(segment.doc(0).is_none());
        assert!(!segment.delete("1"));
    }

    #[test]
    fn test_numeric_indexes_canonical_term() {
        let mut segment = Segment::new();
        let mut d = Document::new("1");
        d.add_field(Field::numeric("year", 2006.0));
        segment.insert(d);

        assert!(segment.posting("year", "2006").is_some());
    }
}
