//! Document builder: flattens incoming JSON, coerces leaves to their mapped
//! field types, and emits a typed document plus any inferred mapping delta.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::analysis::{registry, Analyzer, Token};
use crate::error::{GalenaError, Result};
use crate::index::field::{Document, Field};
use crate::index::segment::format_number;
use crate::mapping::{Mappings, Property, PropertyType, TIMESTAMP_FIELD};

/// Composite field aggregating every indexed text field.
pub const ALL_FIELD: &str = "_all";
/// Stored-only field holding the original JSON.
pub const SOURCE_FIELD: &str = "_source";

/// Result of building one document.
#[derive(Debug)]
pub struct BuildOutput {
    pub doc: Document,
    /// Properties inferred during this build that were not previously mapped.
    pub mapping_delta: Mappings,
    /// The document's `@timestamp` in epoch millis.
    pub timestamp: i64,
}

/// Build a typed document from raw JSON against the current mappings.
///
/// Unknown fields are inferred; fields mapped `index: false` are skipped;
/// a value that cannot be coerced to its declared type rejects the whole
/// document with a mapping error.
pub fn build(
    id: &str,
    source: &Value,
    mappings: &Mappings,
    analyzers: &HashMap<String, Arc<Analyzer>>,
) -> Result<BuildOutput> {
    let mut doc = Document::new(id);
    let mut mapping_delta = Mappings::new();
    let mut timestamp: Option<i64> = None;

    let mut all_tokens: Vec<Token> = Vec::new();
    let mut all_raw = String::new();

    let mut leaves = Vec::new();
    flatten("", source, &mut leaves);

    for (key, value) in leaves {
        if value.is_null() {
            continue;
        }

        let Some((prop, inferred)) = effective_property(mappings, &mapping_delta, &key, &value)
        else {
            continue;
        };
        if inferred {
            mapping_delta.set_property(key.clone(), prop.clone());
        }
        if !prop.index {
            continue;
        }

        if key == TIMESTAMP_FIELD {
            let millis = parse_time(&value, prop.format.as_deref()).map_err(|e| {
                GalenaError::mapping(format!("field [{key}] {e}"))
            })?;
            timestamp = Some(millis);
            continue;
        }

        let field = match prop.prop_type {
            PropertyType::Text => {
                let raw = coerce_string(&value);
                let analyzer = index_analyzer(analyzers, mappings, &key);
                let field = Field::text(&key, &raw, &analyzer)?;
                if let crate::index::field::FieldValue::Text { tokens, .. } = &field.value {
                    let base = all_tokens.len();
                    for (i, token) in tokens.iter().enumerate() {
                        let mut t = token.clone();
                        t.position = base + i;
                        all_tokens.push(t);
                    }
                }
                if !all_raw.is_empty() {
                    all_raw.push(' ');
                }
                all_raw.push_str(&raw);
                field
            }
            PropertyType::Numeric => {
                let number = match &value {
                    Value::Number(n) => n.as_f64().unwrap_or(0.0),
                    Value::String(s) => s.parse().map_err(|_| {
                        GalenaError::mapping(format!(
                            "field [{key}] of type [numeric] got unparseable value [{s}]"
                        ))
                    })?,
                    other => {
                        return Err(GalenaError::mapping(format!(
                            "field [{key}] of type [numeric] got value {other}"
                        )));
                    }
                };
                Field::numeric(&key, number)
            }
            PropertyType::Keyword => match &value {
                Value::Bool(b) => Field::keyword(&key, if *b { "true" } else { "false" }),
                Value::String(s) => Field::keyword(&key, s).aggregatable(),
                other => {
                    return Err(GalenaError::mapping(format!(
                        "field [{key}] of type [keyword] only supports strings, got {other}"
                    )));
                }
            },
            PropertyType::Bool => {
                let b = match &value {
                    Value::Bool(b) => *b,
                    Value::String(s) if s == "true" || s == "false" => s == "true",
                    other => {
                        return Err(GalenaError::mapping(format!(
                            "field [{key}] of type [bool] got value {other}"
                        )));
                    }
                };
                Field::keyword(&key, if b { "true" } else { "false" })
            }
            PropertyType::Time => {
                let millis = parse_time(&value, prop.format.as_deref()).map_err(|e| {
                    GalenaError::mapping(format!("field [{key}] {e}"))
                })?;
                Field::time(&key, millis)
            }
        };

        doc.add_field(apply_flags(field, &prop));
    }

    // @timestamp: the parsed value when present, ingestion time otherwise.
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
    doc.add_field(
        Field::time(TIMESTAMP_FIELD, timestamp)
            .store_value()
            .sortable()
            .aggregatable(),
    );

    // The original document, stored verbatim.
    doc.add_field(Field::stored_only(
        SOURCE_FIELD,
        serde_json::to_vec(source)?,
    ));

    // Composite full-text fallback over every indexed text field.
    if !all_tokens.is_empty() {
        doc.add_field(Field::text_from_tokens(ALL_FIELD, all_raw, all_tokens));
    }

    Ok(BuildOutput {
        doc,
        mapping_delta,
        timestamp,
    })
}

/// Current property for a key: existing mapping first, then anything this
/// build already inferred, then fresh inference.
fn effective_property(
    mappings: &Mappings,
    delta: &Mappings,
    key: &str,
    value: &Value,
) -> Option<(Property, bool)> {
    if let Some(prop) = mappings.get(key) {
        return Some((prop.clone(), false));
    }
    if let Some(prop) = delta.get(key) {
        return Some((prop.clone(), false));
    }
    mappings.infer_or_get(key, value)
}

fn apply_flags(mut field: Field, prop: &Property) -> Field {
    if prop.store {
        field = field.store_value();
    }
    if prop.sortable {
        field = field.sortable();
    }
    if prop.aggregatable {
        field = field.aggregatable();
    }
    if prop.highlightable {
        field = field.highlight_matches();
    }
    field
}

fn index_analyzer(
    analyzers: &HashMap<String, Arc<Analyzer>>,
    mappings: &Mappings,
    field: &str,
) -> Arc<Analyzer> {
    registry::resolve_for_field(analyzers, mappings, field)
        .0
        .unwrap_or_else(|| Arc::new(Analyzer::standard()))
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Flatten nested objects with `.` separators; array elements become
/// repeated values of the same leaf.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(prefix, item, out);
            }
        }
        other => {
            if !prefix.is_empty() {
                out.push((prefix.to_string(), other.clone()));
            }
        }
    }
}

/// Parse a time value: RFC3339, the property's declared format, or epoch
/// milliseconds.
pub fn parse_time(value: &Value, format: Option<&str>) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| GalenaError::mapping("of type [time] got a non-integer number")),
        Value::String(s) => {
            if let Some(fmt) = format {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Ok(dt.and_utc().timestamp_millis());
                }
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| {
                    GalenaError::mapping(format!("of type [time] got unparseable value [{s}]"))
                })
        }
        other => Err(GalenaError::mapping(format!(
            "of type [time] got value {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_simple(source: Value) -> BuildOutput {
        build("doc1", &source, &Mappings::new(), &HashMap::new()).unwrap()
    }

    #[test]
    fn test_build_infers_mappings() {
        let out = build_simple(json!({
            "Athlete": "DEMTSCHENKO",
            "Year": 2006,
            "Active": true
        }));

        assert_eq!(
            out.mapping_delta.get("Athlete").unwrap().prop_type,
            PropertyType::Text
        );
        assert_eq!(
            out.mapping_delta.get("Year").unwrap().prop_type,
            PropertyType::Numeric
        );
        assert_eq!(
            out.mapping_delta.get("Active").unwrap().prop_type,
            PropertyType::Bool
        );
    }

    #[test]
    fn test_build_appends_reserved_fields() {
        let out = build_simple(json!({"City": "Turin"}));
        let names: Vec<&str> = out.doc.fields.iter().map(|f| f.name.as_str()).collect();

        assert!(names.contains(&TIMESTAMP_FIELD));
        assert!(names.contains(&SOURCE_FIELD));
        assert!(names.contains(&ALL_FIELD));
    }

    #[test]
    fn test_nested_objects_flatten_with_dots() {
        let out = build_simple(json!({"venue": {"city": "Turin"}}));
        assert!(out.mapping_delta.contains("venue.city"));
    }

    #[test]
    fn test_known_field_is_not_in_delta() {
        let mut mappings = Mappings::new();
        mappings.set_property("City", Property::new(PropertyType::Text));

        let out = build("1", &json!({"City": "Turin"}), &mappings, &HashMap::new()).unwrap();
        assert!(!out.mapping_delta.contains("City"));
    }

    #[test]
    fn test_unindexed_field_is_skipped() {
        let mut mappings = Mappings::new();
        let mut prop = Property::new(PropertyType::Text);
        prop.index = false;
        mappings.set_property("secret", prop);

        let out = build("1", &json!({"secret": "hidden"}), &mappings, &HashMap::new()).unwrap();
        assert!(!out.doc.fields.iter().any(|f| f.name == "secret"));
    }

    #[test]
    fn test_bad_time_value_rejects_document() {
        let mut mappings = Mappings::new();
        mappings.set_property("when", Property::new(PropertyType::Time));

        let err = build(
            "1",
            &json!({"when": "not a date"}),
            &mappings,
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GalenaError::Mapping(_)));
    }

    #[test]
    fn test_timestamp_from_document_is_used() {
        let out = build_simple(json!({
            "@timestamp": "2022-06-19T12:00:00Z",
            "msg": "hello"
        }));

        let expected = DateTime::parse_from_rfc3339("2022-06-19T12:00:00Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(out.timestamp, expected);
    }

    #[test]
    fn test_bool_for_keyword_property_is_stringified() {
        let mut mappings = Mappings::new();
        mappings.set_property("flag", Property::new(PropertyType::Keyword));

        let out = build("1", &json!({"flag": true}), &mappings, &HashMap::new()).unwrap();
        let field = out.doc.fields.iter().find(|f| f.name == "flag").unwrap();
        match &field.value {
            crate::index::field::FieldValue::Keyword(v) => assert_eq!(v, "true"),
            _ => panic!("expected keyword"),
        }
    }

    #[test]
    fn test_array_leaves_repeat() {
        let out = build_simple(json!({"tags": ["a", "b"]}));
        let count = out.doc.fields.iter().filter(|f| f.name == "tags").count();
        assert_eq!(count, 2);
    }
}
