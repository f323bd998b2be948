//! `bool` and `boosting` compound query parsers.

use serde_json::Value;

use crate::dsl::{query, Context};
use crate::error::{GalenaError, Result};
use crate::index::IndexQuery;

/// A clause key may hold one query object or an array of them.
fn clause_list(ctx: &Context, body: &Value, key: &str) -> Result<Vec<IndexQuery>> {
    match body.get(key) {
        None => Ok(Vec::new()),
        Some(value @ Value::Object(_)) => Ok(vec![query::parse(ctx, value)?]),
        Some(Value::Array(items)) => items.iter().map(|item| query::parse(ctx, item)).collect(),
        Some(other) => Err(GalenaError::parsing(format!(
            "[bool] [{key}] doesn't support value {other}"
        ))),
    }
}

pub fn bool_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let must = clause_list(ctx, body, "must")?;
    let should = clause_list(ctx, body, "should")?;
    let must_not = clause_list(ctx, body, "must_not")?;
    let filter = clause_list(ctx, body, "filter")?;

    let minimum_should_match = match body.get("minimum_should_match") {
        None => 0,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
        Some(Value::String(s)) => s.parse().map_err(|_| {
            GalenaError::parsing(format!(
                "[bool] minimum_should_match doesn't support value [{s}]"
            ))
        })?,
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "[bool] minimum_should_match doesn't support value {other}"
            )));
        }
    };

    Ok(IndexQuery::Bool {
        must,
        should,
        must_not,
        filter,
        minimum_should_match,
    })
}

pub fn boosting_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let positive = body
        .get("positive")
        .ok_or_else(|| GalenaError::parsing("[boosting] is missing positive"))?;
    let negative = body
        .get("negative")
        .ok_or_else(|| GalenaError::parsing("[boosting] is missing negative"))?;
    let negative_boost = body
        .get("negative_boost")
        .and_then(Value::as_f64)
        .unwrap_or(0.5) as f32;

    Ok(IndexQuery::Boosting {
        positive: Box::new(query::parse(ctx, positive)?),
        negative: Box::new(query::parse(ctx, negative)?),
        negative_boost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mappings;
    use serde_json::json;
    use std::collections::HashMap;

    fn parse_bool(body: Value) -> Result<IndexQuery> {
        let mappings = Mappings::new();
        let analyzers = HashMap::new();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        bool_query(&ctx, &body)
    }

    #[test]
    fn test_bool_accepts_object_or_array_clauses() {
        let q = parse_bool(json!({
            "must": {"term": {"a": "x"}},
            "should": [{"term": {"b": "y"}}, {"term": {"c": "z"}}],
            "minimum_should_match": 1
        }))
        .unwrap();

        match q {
            IndexQuery::Bool {
                must,
                should,
                minimum_should_match,
                ..
            } => {
                assert_eq!(must.len(), 1);
                assert_eq!(should.len(), 2);
                assert_eq!(minimum_should_match, 1);
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_nested_bool() {
        let q = parse_bool(json!({
            "must": {"bool": {"must": {"term": {"a": "x"}}}}
        }))
        .unwrap();

        match q {
            IndexQuery::Bool { must, .. } => {
                assert!(matches!(&must[0], IndexQuery::Bool { .. }));
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_boosting_defaults() {
        let mappings = Mappings::new();
        let analyzers = HashMap::new();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = boosting_query(
            &ctx,
            &json!({
                "positive": {"term": {"a": "x"}},
                "negative": {"term": {"b": "y"}}
            }),
        )
        .unwrap();

        assert!(matches!(
            q,
            IndexQuery::Boosting { negative_boost, .. } if (negative_boost - 0.5).abs() < f32::EPSILON
        ));
    }
}
