//! Structured query DSL translator.
//!
//! Walks the JSON request body and produces a [`ParsedQuery`]: a primitive
//! query tree plus sort order, paging, aggregations, and highlight settings,
//! all parameterized by the index's mappings and analyzers.

pub mod aggs;
pub mod boolq;
pub mod fulltext;
pub mod geo;
pub mod highlight;
pub mod query;
pub mod range;
pub mod termlevel;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::analysis::{registry, Analyzer};
use crate::error::{GalenaError, Result};
use crate::index::collector::{SortBy, SortOrder, SortSpec};
use crate::index::IndexQuery;
use crate::mapping::{Mappings, TIMESTAMP_FIELD};

pub use aggs::Aggregation;
pub use highlight::HighlightSpec;

/// Default page size when the request omits `size`.
pub const DEFAULT_SIZE: usize = 10;

/// `_source` filtering requested by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SourceFilter {
    #[default]
    All,
    None,
    Fields(Vec<String>),
}

impl SourceFilter {
    /// Apply the filter to a deserialized `_source` document.
    pub fn apply(&self, source: Value) -> Option<Value> {
        match self {
            SourceFilter::All => Some(source),
            SourceFilter::None => None,
            SourceFilter::Fields(fields) => {
                let Value::Object(map) = source else {
                    return Some(source);
                };
                let filtered: serde_json::Map<String, Value> = map
                    .into_iter()
                    .filter(|(k, _)| fields.contains(k))
                    .collect();
                Some(Value::Object(filtered))
            }
        }
    }
}

/// A fully translated search request.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub query: IndexQuery,
    pub sort: SortOrder,
    pub size: usize,
    pub from: usize,
    /// The merge heap is inverted relative to the user-visible order;
    /// results are reversed in place at the end when set.
    pub reversed: bool,
    pub aggs: Vec<(String, Aggregation)>,
    pub highlight: Option<HighlightSpec>,
    pub source: SourceFilter,
}

/// Shared translation context.
pub struct Context<'a> {
    pub mappings: &'a Mappings,
    pub analyzers: &'a HashMap<String, Arc<Analyzer>>,
}

impl<'a> Context<'a> {
    /// Analyzer for a text-matching clause: explicit clause analyzer, else
    /// the field's search analyzer, else its index analyzer, else the
    /// registry default, else standard.
    pub fn search_analyzer(
        &self,
        field: &str,
        clause_analyzer: Option<&str>,
    ) -> Result<Arc<Analyzer>> {
        if let Some(name) = clause_analyzer.filter(|n| !n.is_empty()) {
            return registry::resolve(self.analyzers, name);
        }
        let (index_analyzer, search_analyzer) =
            registry::resolve_for_field(self.analyzers, self.mappings, field);
        if let Some(analyzer) = search_analyzer.or(index_analyzer) {
            return Ok(analyzer);
        }
        if let Ok(default) = registry::resolve(self.analyzers, "default") {
            return Ok(default);
        }
        Ok(Arc::new(Analyzer::standard()))
    }
}

/// Translate a search request body against an index's mappings/analyzers.
pub fn translate(
    body: &Value,
    mappings: &Mappings,
    analyzers: &HashMap<String, Arc<Analyzer>>,
    max_results: usize,
) -> Result<ParsedQuery> {
    let ctx = Context {
        mappings,
        analyzers,
    };

    let query = match body.get("query") {
        Some(q) => query::parse(&ctx, q)?,
        None => IndexQuery::MatchAll,
    };

    let size = match body.get("size") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| GalenaError::parsing("[size] must be a non-negative integer"))?
            as usize,
        None => DEFAULT_SIZE,
    }
    .min(max_results);

    let from = match body.get("from").or_else(|| body.get("skip")) {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| GalenaError::parsing("[from] must be a non-negative integer"))?
            as usize,
        None => 0,
    };

    let sort = match body.get("sort") {
        Some(v) => parse_sort(v)?,
        None => vec![SortSpec::score_desc()],
    };

    let aggs_body = body.get("aggs").or_else(|| body.get("aggregations"));
    let aggs = match aggs_body {
        Some(v) => aggs::parse(v)?,
        None => Vec::new(),
    };

    let highlight = match body.get("highlight") {
        Some(v) => Some(highlight::parse(v)?),
        None => None,
    };

    let source = match body.get("_source") {
        Some(Value::Bool(true)) | None => SourceFilter::All,
        Some(Value::Bool(false)) => SourceFilter::None,
        Some(Value::Array(items)) => SourceFilter::Fields(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "[_source] doesn't support value {other}"
            )));
        }
    };

    Ok(ParsedQuery {
        query,
        sort,
        size,
        from,
        reversed: false,
        aggs,
        highlight,
        source,
    })
}

fn parse_sort(value: &Value) -> Result<SortOrder> {
    let mut order = SortOrder::new();
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    for entry in entries {
        match entry {
            Value::String(field) => order.push(sort_spec(field, None)),
            Value::Object(map) => {
                for (field, config) in map {
                    let desc = match config {
                        Value::String(direction) => direction == "desc",
                        Value::Object(inner) => {
                            inner.get("order").and_then(Value::as_str) == Some("desc")
                        }
                        other => {
                            return Err(GalenaError::parsing(format!(
                                "[sort] [{field}] doesn't support value {other}"
                            )));
                        }
                    };
                    order.push(sort_spec(field, Some(desc)));
                }
            }
            other => {
                return Err(GalenaError::parsing(format!(
                    "[sort] doesn't support value {other}"
                )));
            }
        }
    }

    if order.is_empty() {
        order.push(SortSpec::score_desc());
    }
    Ok(order)
}

fn sort_spec(field: &str, explicit_desc: Option<bool>) -> SortSpec {
    // A leading '-' flips the direction, ES-query-string style.
    let (field, negated) = match field.strip_prefix('-') {
        Some(stripped) => (stripped, true),
        None => (field, false),
    };
    // Bare `_score` means best-first; bare fields sort ascending.
    let mut desc = explicit_desc.unwrap_or(field == "_score");
    if negated {
        desc = !desc;
    }

    if field == "_score" {
        SortSpec {
            by: SortBy::Score,
            desc,
        }
    } else {
        SortSpec::field(field, desc)
    }
}

/// Extract the `@timestamp` window a query constrains, for shard pruning.
/// Zero means unbounded on that side.
pub fn time_range(query: &IndexQuery) -> (i64, i64) {
    match query {
        IndexQuery::TimeRange {
            field, min, max, ..
        } if field == TIMESTAMP_FIELD => (min.unwrap_or(0), max.unwrap_or(0)),
        IndexQuery::Bool { must, filter, .. } => {
            for clause in must.iter().chain(filter.iter()) {
                let (min, max) = time_range(clause);
                if min != 0 || max != 0 {
                    return (min, max);
                }
            }
            (0, 0)
        }
        IndexQuery::Boost { query, .. } => time_range(query),
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translate_body(body: Value) -> Result<ParsedQuery> {
        translate(&body, &Mappings::new(), &HashMap::new(), 10_000)
    }

    #[test]
    fn test_defaults() {
        let parsed = translate_body(json!({})).unwrap();
        assert!(matches!(parsed.query, IndexQuery::MatchAll));
        assert_eq!(parsed.size, DEFAULT_SIZE);
        assert_eq!(parsed.from, 0);
        assert!(matches!(parsed.sort[0].by, SortBy::Score));
    }

    #[test]
    fn test_size_is_capped() {
        let parsed = translate_body(json!({"size": 999_999})).unwrap();
        assert_eq!(parsed.size, 10_000);
    }

    #[test]
    fn test_sort_shapes() {
        let parsed = translate_body(json!({
            "sort": [{"Year": {"order": "desc"}}, "_score", "-City"]
        }))
        .unwrap();

        assert!(matches!(&parsed.sort[0].by, SortBy::Field(f) if f == "Year"));
        assert!(parsed.sort[0].desc);
        assert!(matches!(parsed.sort[1].by, SortBy::Score));
        assert!(matches!(&parsed.sort[2].by, SortBy::Field(f) if f == "City"));
        assert!(parsed.sort[2].desc);
    }

    #[test]
    fn test_source_filter_fields() {
        let parsed = translate_body(json!({"_source": ["City"]})).unwrap();
        let filtered = parsed
            .source
            .apply(json!({"City": "Turin", "Year": 2006}))
            .unwrap();
        assert_eq!(filtered, json!({"City": "Turin"}));
    }

    #[test]
    fn test_time_range_extraction_through_bool() {
        let body = json!({
            "query": {
                "bool": {
                    "filter": [
                        {"range": {"@timestamp": {"gte": 1000, "lt": 2000}}}
                    ]
                }
            }
        });
        let parsed = translate_body(body).unwrap();
        assert_eq!(time_range(&parsed.query), (1000, 2000));
    }
}
