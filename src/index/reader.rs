//! Point-in-time reader over a shard segment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::index::collector::{SortBy, SortOrder, SortValue};
use crate::index::query::{self, IndexQuery};
use crate::index::segment::{DocValue, Segment};
use crate::mapping::TIMESTAMP_FIELD;

/// A snapshot reader for one shard. Cheap to clone; holds the segment alive
/// until dropped, which releases it.
#[derive(Clone)]
pub struct IndexReader {
    segment: Arc<Segment>,
}

impl IndexReader {
    pub fn new(segment: Arc<Segment>) -> Self {
        IndexReader { segment }
    }

    /// Number of live documents visible to this reader.
    pub fn doc_count(&self) -> u32 {
        self.segment.live_docs()
    }

    /// Evaluate a query and build one match per hit, with sort keys aligned
    /// to `order`. No ordering or truncation happens here.
    pub fn matches(&self, query: &IndexQuery, order: &SortOrder) -> Result<Vec<DocumentMatch>> {
        let scores = query::execute(&self.segment, query)?;
        let mut out = Vec::with_capacity(scores.len());

        for (ord, score) in scores {
            let Some(doc) = self.segment.doc(ord) else {
                continue;
            };
            let sort_key = order
                .iter()
                .map(|spec| match &spec.by {
                    SortBy::Score => SortValue::Num(score as f64),
                    SortBy::Field(field) => doc
                        .values
                        .get(field)
                        .and_then(|values| values.first())
                        .map(|value| match value {
                            DocValue::Num(n) => SortValue::Num(*n),
                            DocValue::Time(t) => SortValue::Num(*t as f64),
                            DocValue::Str(s) => SortValue::Str(s.clone()),
                        })
                        .unwrap_or(SortValue::Null),
                })
                .collect();

            out.push(DocumentMatch {
                ord,
                id: doc.id.clone(),
                score,
                sort_key,
                segment: Arc::clone(&self.segment),
                source: None,
                highlight: HashMap::new(),
            });
        }

        Ok(out)
    }
}

/// One matching document flowing through collection and merging.
#[derive(Clone)]
pub struct DocumentMatch {
    /// Ordinal within the owning segment.
    pub ord: u32,
    /// The document `_id`.
    pub id: String,
    pub score: f32,
    /// Values aligned with the search's sort order.
    pub sort_key: Vec<SortValue>,
    pub segment: Arc<Segment>,
    /// Raw `_source` bytes, loaded by [`DocumentMatch::complete`].
    pub source: Option<Vec<u8>>,
    /// Highlighted fragments per field, filled after completion.
    pub highlight: HashMap<String, Vec<String>>,
}

impl DocumentMatch {
    /// Doc values of a field, if any.
    pub fn values(&self, field: &str) -> Option<&Vec<DocValue>> {
        self.segment.doc(self.ord).and_then(|d| d.values.get(field))
    }

    /// The document's `@timestamp` in epoch millis.
    pub fn timestamp(&self) -> Option<i64> {
        self.values(TIMESTAMP_FIELD)?.first().and_then(|v| match v {
            DocValue::Time(t) => Some(*t),
            DocValue::Num(n) => Some(*n as i64),
            DocValue::Str(_) => None,
        })
    }

    /// Load stored fields. Called once a match survives final truncation.
    pub fn complete(&mut self) {
        if self.source.is_none() {
            self.source = self
                .segment
                .doc(self.ord)
                .and_then(|d| d.stored.get("_source").cloned());
        }
    }
}

impl std::fmt::Debug for DocumentMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentMatch")
            .field("ord", &self.ord)
            .field("id", &self.id)
            .field("score", &self.score)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::index::collector::SortSpec;
    use crate::index::field::{Document, Field};

    fn reader_with_docs() -> IndexReader {
        let analyzer = Analyzer::standard();
        let mut segment = Segment::new();
        for (id, city, year) in [("1", "Turin", 2006.0), ("2", "Athens", 2004.0)] {
            let mut doc = Document::new(id);
            doc.add_field(Field::text("city", city, &analyzer).unwrap());
            doc.add_field(Field::numeric("year", year).sortable());
            segment.insert(doc);
        }
        IndexReader::new(Arc::new(segment))
    }

    #[test]
    fn test_matches_carry_sort_keys() {
        let reader = reader_with_docs();
        let order = vec![SortSpec::field("year", false)];
        let matches = reader
            .matches(&IndexQuery::MatchAll, &order)
            .unwrap();

        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert!(matches!(m.sort_key[0], SortValue::Num(_)));
        }
    }

    #[test]
    fn test_missing_sort_field_is_null() {
        let reader = reader_with_docs();
        let order = vec![SortSpec::field("nope", false)];
        let matches = reader
            .matches(&IndexQuery::MatchAll, &order)
            .unwrap();

        assert!(matches.iter().all(|m| m.sort_key[0] == SortValue::Null));
    }
}
