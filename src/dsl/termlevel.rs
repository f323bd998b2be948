//! Term-level query parsers: exact terms, prefixes, patterns, fuzzy, ids.

use serde_json::Value;

use crate::error::{GalenaError, Result};
use crate::index::segment::format_number;
use crate::index::IndexQuery;

/// Default Levenshtein edit distance for fuzzy queries.
pub const DEFAULT_FUZZINESS: u32 = 2;

/// Coerce a scalar clause value to its exact term string.
fn term_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.as_f64().map(format_number).unwrap_or_else(|| n.to_string())),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(GalenaError::parsing(format!(
            "value {other} is not a term"
        ))),
    }
}

/// Pull the single `field: spec` pair out of a term-style clause body.
fn single_field(body: &Value) -> Result<(&String, &Value)> {
    let Value::Object(map) = body else {
        return Err(GalenaError::parsing("expected an object"));
    };
    let mut entries = map.iter().filter(|(k, _)| *k != "boost");
    let first = entries
        .next()
        .ok_or_else(|| GalenaError::parsing("missing field"))?;
    if entries.next().is_some() {
        return Err(GalenaError::parsing(
            "supports only one field per clause",
        ));
    }
    Ok(first)
}

/// `value` either inline or under the named key of an options object.
fn inline_or<'v>(spec: &'v Value, key: &str) -> &'v Value {
    match spec {
        Value::Object(map) => map.get(key).unwrap_or(spec),
        _ => spec,
    }
}

pub fn term_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let value = term_value(inline_or(spec, "value"))?;
    Ok(with_boost(
        IndexQuery::Term {
            field: field.clone(),
            value,
        },
        spec,
    ))
}

pub fn terms_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let Value::Array(items) = spec else {
        return Err(GalenaError::parsing("[terms] expects an array of values"));
    };

    let should = items
        .iter()
        .map(|item| {
            Ok(IndexQuery::Term {
                field: field.clone(),
                value: term_value(item)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(IndexQuery::Bool {
        must: vec![],
        should,
        must_not: vec![],
        filter: vec![],
        minimum_should_match: 1,
    })
}

pub fn terms_set_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let terms = spec
        .get("terms")
        .and_then(Value::as_array)
        .ok_or_else(|| GalenaError::parsing("[terms_set] is missing terms"))?
        .iter()
        .map(term_value)
        .collect::<Result<Vec<_>>>()?;
    let min_match_field = spec
        .get("minimum_should_match_field")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            GalenaError::parsing("[terms_set] is missing minimum_should_match_field")
        })?;

    Ok(IndexQuery::TermsSet {
        field: field.clone(),
        terms,
        min_match_field: min_match_field.to_string(),
    })
}

pub fn exists_query(body: &Value) -> Result<IndexQuery> {
    let field = body
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| GalenaError::parsing("[exists] is missing field"))?;
    Ok(IndexQuery::Exists {
        field: field.to_string(),
    })
}

pub fn ids_query(body: &Value) -> Result<IndexQuery> {
    let values = body
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| GalenaError::parsing("[ids] is missing values"))?;

    let should = values
        .iter()
        .map(|item| {
            Ok(IndexQuery::Term {
                field: "_id".to_string(),
                value: term_value(item)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(IndexQuery::Bool {
        must: vec![],
        should,
        must_not: vec![],
        filter: vec![],
        minimum_should_match: 1,
    })
}

pub fn prefix_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let value = term_value(inline_or(spec, "value"))?;
    Ok(with_boost(
        IndexQuery::Prefix {
            field: field.clone(),
            value,
        },
        spec,
    ))
}

pub fn wildcard_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let pattern = term_value(inline_or(spec, "value"))?;
    Ok(with_boost(
        IndexQuery::Wildcard {
            field: field.clone(),
            pattern,
        },
        spec,
    ))
}

pub fn regexp_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let pattern = term_value(inline_or(spec, "value"))?;
    Ok(with_boost(
        IndexQuery::Regexp {
            field: field.clone(),
            pattern,
        },
        spec,
    ))
}

pub fn fuzzy_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let value = term_value(inline_or(spec, "value"))?;

    let fuzziness = match spec.get("fuzziness") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_FUZZINESS as u64) as u32,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") => DEFAULT_FUZZINESS,
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "[fuzzy] fuzziness doesn't support value {other}"
            )));
        }
        None => DEFAULT_FUZZINESS,
    };
    let prefix_length = spec
        .get("prefix_length")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    Ok(with_boost(
        IndexQuery::Fuzzy {
            field: field.clone(),
            value,
            fuzziness,
            prefix_length,
        },
        spec,
    ))
}

/// Wrap a query with a boost when the clause declares one.
pub fn with_boost(query: IndexQuery, spec: &Value) -> IndexQuery {
    match spec.get("boost").and_then(Value::as_f64) {
        Some(boost) if boost != 1.0 => IndexQuery::Boost {
            query: Box::new(query),
            boost: boost as f32,
        },
        _ => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_term_shorthand_and_options() {
        let q = term_query(&json!({"City": "turin"})).unwrap();
        assert!(matches!(q, IndexQuery::Term { ref value, .. } if value == "turin"));

        let q = term_query(&json!({"City": {"value": "turin", "boost": 2.0}})).unwrap();
        assert!(matches!(q, IndexQuery::Boost { .. }));
    }

    #[test]
    fn test_term_numeric_value_canonicalized() {
        let q = term_query(&json!({"Year": 2006})).unwrap();
        assert!(matches!(q, IndexQuery::Term { ref value, .. } if value == "2006"));
    }

    #[test]
    fn test_terms_becomes_should() {
        let q = terms_query(&json!({"City": ["turin", "athens"]})).unwrap();
        match q {
            IndexQuery::Bool {
                should,
                minimum_should_match,
                ..
            } => {
                assert_eq!(should.len(), 2);
                assert_eq!(minimum_should_match, 1);
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_fuzzy_defaults() {
        let q = fuzzy_query(&json!({"City": "turin"})).unwrap();
        match q {
            IndexQuery::Fuzzy {
                fuzziness,
                prefix_length,
                ..
            } => {
                assert_eq!(fuzziness, 2);
                assert_eq!(prefix_length, 0);
            }
            _ => panic!("expected fuzzy"),
        }
    }

    #[test]
    fn test_ids_targets_id_field() {
        let q = ids_query(&json!({"values": ["a", "b"]})).unwrap();
        match q {
            IndexQuery::Bool { should, .. } => {
                assert!(should
                    .iter()
                    .all(|s| matches!(s, IndexQuery::Term { field, .. } if field == "_id")));
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_multiple_fields_rejected() {
        assert!(term_query(&json!({"a": "x", "b": "y"})).is_err());
    }
}
