//! Highlight settings parser.

use serde_json::Value;

use crate::error::{GalenaError, Result};

/// Parsed `highlight` section of a search request.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSpec {
    pub fields: Vec<String>,
    pub pre_tag: String,
    pub post_tag: String,
}

pub fn parse(body: &Value) -> Result<HighlightSpec> {
    let fields = match body.get("fields") {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "[highlight] fields doesn't support value {other}"
            )));
        }
        None => Vec::new(),
    };

    let first_tag = |key: &str, default: &str| {
        body.get(key)
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    Ok(HighlightSpec {
        fields,
        pre_tag: first_tag("pre_tags", "<mark>"),
        post_tag: first_tag("post_tags", "</mark>"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fields_and_tags() {
        let spec = parse(&json!({
            "fields": {"City": {}},
            "pre_tags": ["<b>"],
            "post_tags": ["</b>"]
        }))
        .unwrap();

        assert_eq!(spec.fields, vec!["City"]);
        assert_eq!(spec.pre_tag, "<b>");
        assert_eq!(spec.post_tag, "</b>");
    }

    #[test]
    fn test_default_tags() {
        let spec = parse(&json!({"fields": {"City": {}}})).unwrap();
        assert_eq!(spec.pre_tag, "<mark>");
        assert_eq!(spec.post_tag, "</mark>");
    }
}
