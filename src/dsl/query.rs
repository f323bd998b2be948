//! Query-kind dispatcher: exactly one kind per object level.

use serde_json::Value;

use crate::dsl::{boolq, fulltext, geo, range, termlevel, Context};
use crate::error::{GalenaError, Result};
use crate::index::IndexQuery;

/// Parse one query object into a primitive query tree.
pub fn parse(ctx: &Context, query: &Value) -> Result<IndexQuery> {
    let Value::Object(map) = query else {
        return Err(GalenaError::parsing(format!(
            "query doesn't support value type {query}"
        )));
    };

    let mut result: Option<IndexQuery> = None;
    let mut seen_kind = String::new();

    for (key, body) in map {
        if result.is_some() {
            return Err(GalenaError::parsing(format!(
                "[{seen_kind}] malformed query, excepted [END_OBJECT] but found [FIELD_NAME] {key}"
            )));
        }
        let kind = key.to_lowercase();
        seen_kind = kind.clone();

        if !matches!(body, Value::Object(_)) {
            return Err(GalenaError::parsing(format!(
                "[{kind}] query doesn't support value type {body}"
            )));
        }

        let parsed = match kind.as_str() {
            "bool" => boolq::bool_query(ctx, body),
            "boosting" => boolq::boosting_query(ctx, body),
            "match" => fulltext::match_query(ctx, body),
            "match_bool_prefix" => fulltext::match_bool_prefix_query(ctx, body),
            "match_phrase" => fulltext::match_phrase_query(ctx, body),
            "match_phrase_prefix" => fulltext::match_phrase_prefix_query(ctx, body),
            "multi_match" => fulltext::multi_match_query(ctx, body),
            "match_all" => Ok(IndexQuery::MatchAll),
            "match_none" => Ok(IndexQuery::MatchNone),
            "combined_fields" => fulltext::combined_fields_query(ctx, body),
            "query_string" => fulltext::query_string_query(ctx, body, false),
            "simple_query_string" => fulltext::query_string_query(ctx, body, true),
            "exists" => termlevel::exists_query(body),
            "ids" => termlevel::ids_query(body),
            "range" => range::range_query(ctx, body),
            "regexp" => termlevel::regexp_query(body),
            "prefix" => termlevel::prefix_query(body),
            "fuzzy" => termlevel::fuzzy_query(body),
            "wildcard" => termlevel::wildcard_query(body),
            "term" => termlevel::term_query(body),
            "terms" => termlevel::terms_query(body),
            "terms_set" => termlevel::terms_set_query(body),
            "geo_bounding_box" => geo::bounding_box_query(body),
            "geo_distance" => geo::distance_query(body),
            "geo_polygon" => geo::polygon_query(body),
            "geo_shape" => geo::shape_query(body),
            _ => {
                return Err(GalenaError::parsing(format!(
                    "[{kind}] query doesn't support"
                )));
            }
        };

        result = Some(parsed.map_err(|e| GalenaError::xcontent(kind, e))?);
    }

    result.ok_or_else(|| GalenaError::parsing("query is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mappings;
    use serde_json::json;
    use std::collections::HashMap;

    fn parse_query(body: Value) -> Result<IndexQuery> {
        let mappings = Mappings::new();
        let analyzers = HashMap::new();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        parse(&ctx, &body)
    }

    #[test]
    fn test_single_kind_dispatch() {
        let query = parse_query(json!({"term": {"City": "turin"}})).unwrap();
        assert!(matches!(query, IndexQuery::Term { .. }));
    }

    #[test]
    fn test_two_sibling_kinds_rejected() {
        let err = parse_query(json!({
            "term": {"a": "b"},
            "match": {"c": "d"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ParsingException"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = parse_query(json!({"frobnicate": {}})).unwrap_err();
        assert!(err.to_string().contains("doesn't support"));
    }

    #[test]
    fn test_sub_parse_failure_wrapped_with_kind() {
        let err = parse_query(json!({"term": {}})).unwrap_err();
        assert!(matches!(
            err,
            GalenaError::XContentParse { ref kind, .. } if kind == "term"
        ));
    }
}
