//! Sort orders and the bounded top-K store used when collecting matches.

use std::cmp::Ordering;

use crate::index::reader::DocumentMatch;

/// What a sort key reads from a match.
#[derive(Debug, Clone, PartialEq)]
pub enum SortBy {
    /// Relevance score.
    Score,
    /// A doc value of the named field.
    Field(String),
}

/// One sort criterion.
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub by: SortBy,
    pub desc: bool,
}

impl SortSpec {
    pub fn score_desc() -> Self {
        SortSpec {
            by: SortBy::Score,
            desc: true,
        }
    }

    pub fn field<S: Into<String>>(name: S, desc: bool) -> Self {
        SortSpec {
            by: SortBy::Field(name.into()),
            desc,
        }
    }
}

/// A full sort order; the default is score descending.
pub type SortOrder = Vec<SortSpec>;

/// Materialized sort key value for one criterion of one match.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Num(f64),
    Str(String),
    /// Missing values sort last regardless of direction.
    Null,
}

impl SortValue {
    fn cmp_value(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Num(a), SortValue::Num(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortValue::Str(a), SortValue::Str(b)) => a.cmp(b),
            // Mixed types compare by display form; rare, but deterministic.
            (SortValue::Num(a), SortValue::Str(b)) => a.to_string().as_str().cmp(b.as_str()),
            (SortValue::Str(a), SortValue::Num(b)) => a.as_str().cmp(b.to_string().as_str()),
            (SortValue::Null, SortValue::Null) => Ordering::Equal,
            (SortValue::Null, _) | (_, SortValue::Null) => Ordering::Equal,
        }
    }
}

/// Compare two matches under a sort order. `Less` means `a` ranks first.
/// Ties break by ascending document id so pagination is stable.
pub fn compare_matches(order: &SortOrder, a: &DocumentMatch, b: &DocumentMatch) -> Ordering {
    for (i, spec) in order.iter().enumerate() {
        let (va, vb) = (&a.sort_key[i], &b.sort_key[i]);

        // Missing-last applies before the direction flip.
        match (va, vb) {
            (SortValue::Null, SortValue::Null) => continue,
            (SortValue::Null, _) => return Ordering::Greater,
            (_, SortValue::Null) => return Ordering::Less,
            _ => {}
        }

        let mut ord = va.cmp_value(vb);
        if spec.desc {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

/// A bounded store that keeps the best `backing` matches seen so far.
///
/// Internally a max-heap where the root is the worst retained match, so an
/// insert beyond capacity ejects in O(log n).
pub struct CollectorStore {
    order: SortOrder,
    backing: usize,
    heap: Vec<DocumentMatch>,
}

impl CollectorStore {
    pub fn new(order: SortOrder, backing: usize) -> Self {
        CollectorStore {
            order,
            backing: backing.max(1),
            heap: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Add a match without exceeding the backing size. Returns the match
    /// that left the store, if any.
    pub fn add_not_exceeding_size(&mut self, doc: DocumentMatch) -> Option<DocumentMatch> {
        if self.heap.len() < self.backing {
            self.heap.push(doc);
            self.sift_up(self.heap.len() - 1);
            return None;
        }

        // Root is the worst retained match; a candidate that does not beat
        // it never enters.
        if compare_matches(&self.order, &doc, &self.heap[0]) == Ordering::Less {
            let ejected = std::mem::replace(&mut self.heap[0], doc);
            self.sift_down(0);
            Some(ejected)
        } else {
            Some(doc)
        }
    }

    /// Materialize the retained matches, best first.
    pub fn into_sorted(mut self) -> Vec<DocumentMatch> {
        let order = std::mem::take(&mut self.order);
        let mut docs = std::mem::take(&mut self.heap);
        docs.sort_by(|a, b| compare_matches(&order, a, b));
        docs
    }

    // `worse` means it ranks after under the sort order.
    fn worse(&self, i: usize, j: usize) -> bool {
        compare_matches(&self.order, &self.heap[i], &self.heap[j]) == Ordering::Greater
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.worse(i, parent) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let (left, right) = (2 * i + 1, 2 * i + 2);
            let mut worst = i;
            if left < self.heap.len() && self.worse(left, worst) {
                worst = left;
            }
            if right < self.heap.len() && self.worse(right, worst) {
                worst = right;
            }
            if worst == i {
                break;
            }
            self.heap.swap(i, worst);
            i = worst;
        }
    }
}
