//! `range` query parser for numeric and time fields.

use serde_json::Value;
use tracing::warn;

use crate::document::parse_time;
use crate::dsl::Context;
use crate::error::{GalenaError, Result};
use crate::index::IndexQuery;
use crate::mapping::{PropertyType, TIMESTAMP_FIELD};

pub fn range_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let Value::Object(map) = body else {
        return Err(GalenaError::parsing("[range] expected an object"));
    };
    let mut entries = map.iter();
    let (field, spec) = entries
        .next()
        .ok_or_else(|| GalenaError::parsing("[range] is missing field"))?;
    if entries.next().is_some() {
        return Err(GalenaError::parsing(
            "[range] supports only one field per clause",
        ));
    }

    let field_type = ctx
        .mappings
        .get(field)
        .map(|prop| prop.prop_type)
        .or_else(|| (field == TIMESTAMP_FIELD).then_some(PropertyType::Time));

    // gt/gte and lt/lte are mutually exclusive per side; inclusive wins
    // only through the key the caller chose.
    let (lower, lower_inclusive) = match (spec.get("gte"), spec.get("gt")) {
        (Some(v), _) => (Some(v), true),
        (None, Some(v)) => (Some(v), false),
        (None, None) => (None, true),
    };
    let (upper, upper_inclusive) = match (spec.get("lte"), spec.get("lt")) {
        (Some(v), _) => (Some(v), true),
        (None, Some(v)) => (Some(v), false),
        (None, None) => (None, false),
    };
    let format = spec.get("format").and_then(Value::as_str);

    match field_type {
        Some(PropertyType::Time) => {
            let min = lower.map(|v| parse_time(v, format)).transpose()?;
            let max = upper.map(|v| parse_time(v, format)).transpose()?;

            // An impossible window is a warning, not an error: it simply
            // matches nothing.
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    warn!(field = %field, min, max, "range query bounds are impossible");
                    return Ok(IndexQuery::MatchNone);
                }
            }

            Ok(IndexQuery::TimeRange {
                field: field.clone(),
                min,
                max,
                min_inclusive: lower_inclusive,
                max_inclusive: upper_inclusive,
            })
        }
        Some(PropertyType::Numeric) | None => {
            let min = lower.map(numeric_bound).transpose()?;
            let max = upper.map(numeric_bound).transpose()?;

            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    warn!(field = %field, min, max, "range query bounds are impossible");
                    return Ok(IndexQuery::MatchNone);
                }
            }

            Ok(IndexQuery::NumericRange {
                field: field.clone(),
                min,
                max,
                min_inclusive: lower_inclusive,
                max_inclusive: upper_inclusive,
            })
        }
        Some(other) => Err(GalenaError::parsing(format!(
            "[range] field [{field}] of type [{}] is not rangeable",
            other.as_str()
        ))),
    }
}

fn numeric_bound(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| GalenaError::parsing("[range] bound is not a finite number")),
        Value::String(s) => s
            .parse()
            .map_err(|_| GalenaError::parsing(format!("[range] bound [{s}] is not a number"))),
        other => Err(GalenaError::parsing(format!(
            "[range] bound doesn't support value {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Mappings, Property};
    use serde_json::json;
    use std::collections::HashMap;

    fn parse_range(mappings: &Mappings, body: Value) -> Result<IndexQuery> {
        let analyzers = HashMap::new();
        let ctx = Context {
            mappings,
            analyzers: &analyzers,
        };
        range_query(&ctx, &body)
    }

    #[test]
    fn test_numeric_half_open() {
        let q = parse_range(
            &Mappings::new(),
            json!({"Year": {"gte": 2004, "lt": 2008}}),
        )
        .unwrap();

        match q {
            IndexQuery::NumericRange {
                min,
                max,
                min_inclusive,
                max_inclusive,
                ..
            } => {
                assert_eq!(min, Some(2004.0));
                assert_eq!(max, Some(2008.0));
                assert!(min_inclusive);
                assert!(!max_inclusive);
            }
            _ => panic!("expected numeric range"),
        }
    }

    #[test]
    fn test_timestamp_is_time_typed_without_mapping() {
        let q = parse_range(
            &Mappings::new(),
            json!({"@timestamp": {"gte": "2022-06-19T10:00:00Z", "lt": "2022-06-19T11:00:00Z"}}),
        )
        .unwrap();

        assert!(matches!(q, IndexQuery::TimeRange { .. }));
    }

    #[test]
    fn test_time_range_accepts_epoch_millis() {
        let mut mappings = Mappings::new();
        mappings.set_property("when", Property::new(PropertyType::Time));

        let q = parse_range(&mappings, json!({"when": {"gte": 1000, "lt": 2000}})).unwrap();
        match q {
            IndexQuery::TimeRange { min, max, .. } => {
                assert_eq!(min, Some(1000));
                assert_eq!(max, Some(2000));
            }
            _ => panic!("expected time range"),
        }
    }

    #[test]
    fn test_impossible_range_matches_nothing() {
        let q = parse_range(
            &Mappings::new(),
            json!({"Year": {"gte": 3000, "lte": 2000}}),
        )
        .unwrap();
        assert!(matches!(q, IndexQuery::MatchNone));
    }

    #[test]
    fn test_text_field_is_not_rangeable() {
        let mut mappings = Mappings::new();
        mappings.set_property("City", Property::new(PropertyType::Text));

        assert!(parse_range(&mappings, json!({"City": {"gte": "a"}})).is_err());
    }
}
