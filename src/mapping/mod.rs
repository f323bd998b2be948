//! Typed field schema per index, with dynamic inference for unknown fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GalenaError, Result};

/// Reserved field that is always mapped as `time`.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field type of a mapping property. Once set it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Text,
    Keyword,
    Numeric,
    Bool,
    Time,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Keyword => "keyword",
            PropertyType::Numeric => "numeric",
            PropertyType::Bool => "bool",
            PropertyType::Time => "time",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Schema entry for a single dotted field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub prop_type: PropertyType,

    #[serde(default = "default_true")]
    pub index: bool,

    #[serde(default)]
    pub store: bool,

    #[serde(default)]
    pub sortable: bool,

    #[serde(default)]
    pub aggregatable: bool,

    #[serde(default)]
    pub highlightable: bool,

    /// Index-time analyzer name for text fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,

    /// Query-time analyzer name; falls back to `analyzer` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,

    /// Time format (chrono format string) for `time` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Property {
    /// A property of the given type with default flags (indexed, not stored).
    pub fn new(prop_type: PropertyType) -> Self {
        Property {
            prop_type,
            index: true,
            store: false,
            sortable: false,
            aggregatable: false,
            highlightable: false,
            analyzer: None,
            search_analyzer: None,
            format: None,
        }
    }
}

/// Ordered lookup from dotted field name to [`Property`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mappings {
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl Mappings {
    pub fn new() -> Self {
        Mappings::default()
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Insert or replace a property. `@timestamp` is always forced to `time`.
    pub fn set_property<S: Into<String>>(&mut self, key: S, prop: Property) {
        let key = key.into();
        if key == TIMESTAMP_FIELD {
            self.properties
                .insert(key, timestamp_property(prop.format.clone()));
        } else {
            self.properties.insert(key, prop);
        }
    }

    /// Ordered view over all properties.
    pub fn list_properties(&self) -> impl Iterator<Item = (&String, &Property)> {
        self.properties.iter()
    }

    /// Infer a property for a field seen for the first time.
    ///
    /// Strings infer as `text` (never `time` from shape alone), numbers as
    /// `numeric`, booleans as `bool`. Nulls and composite values yield no
    /// property.
    pub fn infer(value: &Value) -> Option<Property> {
        match value {
            Value::String(_) => Some(Property::new(PropertyType::Text)),
            Value::Number(_) => Some(Property::new(PropertyType::Numeric)),
            Value::Bool(_) => Some(Property::new(PropertyType::Bool)),
            _ => None,
        }
    }

    /// Look up a property, inferring one when absent. Returns the property
    /// and whether it was newly inferred.
    pub fn infer_or_get(&self, key: &str, value: &Value) -> Option<(Property, bool)> {
        if let Some(existing) = self.properties.get(key) {
            return Some((existing.clone(), false));
        }
        if key == TIMESTAMP_FIELD {
            return Some((timestamp_property(None), true));
        }
        Mappings::infer(value).map(|p| (p, true))
    }

    /// Merge `other` into self. Adding properties and upgrading flags is
    /// allowed; changing an existing property's type is a mapping error.
    pub fn merge(&mut self, other: &Mappings) -> Result<()> {
        for (key, prop) in &other.properties {
            if let Some(existing) = self.properties.get(key) {
                if existing.prop_type != prop.prop_type {
                    return Err(GalenaError::mapping(format!(
                        "mapper [{key}] cannot be changed from type [{}] to [{}]",
                        existing.prop_type.as_str(),
                        prop.prop_type.as_str()
                    )));
                }
            }
            self.set_property(key.clone(), prop.clone());
        }
        self.ensure_timestamp();
        Ok(())
    }

    /// Force the reserved `@timestamp` property to exist as `time`.
    pub fn ensure_timestamp(&mut self) {
        let format = self
            .properties
            .get(TIMESTAMP_FIELD)
            .and_then(|p| p.format.clone());
        self.properties
            .insert(TIMESTAMP_FIELD.to_string(), timestamp_property(format));
    }
}

/// `@timestamp` needs date_range/date_histogram aggregation and sorting.
fn timestamp_property(format: Option<String>) -> Property {
    let mut prop = Property::new(PropertyType::Time);
    prop.store = true;
    prop.sortable = true;
    prop.aggregatable = true;
    prop.format = format;
    prop
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inference_matrix() {
        assert_eq!(
            Mappings::infer(&json!("text")).unwrap().prop_type,
            PropertyType::Text
        );
        assert_eq!(
            Mappings::infer(&json!(3.14)).unwrap().prop_type,
            PropertyType::Numeric
        );
        assert_eq!(
            Mappings::infer(&json!(true)).unwrap().prop_type,
            PropertyType::Bool
        );
        assert!(Mappings::infer(&json!(null)).is_none());
    }

    #[test]
    fn test_iso_string_is_not_inferred_as_time() {
        let prop = Mappings::infer(&json!("2022-06-19T12:00:00Z")).unwrap();
        assert_eq!(prop.prop_type, PropertyType::Text);
    }

    #[test]
    fn test_timestamp_always_forced_to_time() {
        let mut mappings = Mappings::new();
        mappings.set_property(TIMESTAMP_FIELD, Property::new(PropertyType::Keyword));
        assert_eq!(
            mappings.get(TIMESTAMP_FIELD).unwrap().prop_type,
            PropertyType::Time
        );
    }

    #[test]
    fn test_merge_rejects_type_change() {
        let mut mappings = Mappings::new();
        mappings.set_property("year", Property::new(PropertyType::Numeric));

        let mut update = Mappings::new();
        update.set_property("year", Property::new(PropertyType::Keyword));

        let err = mappings.merge(&update).unwrap_err();
        assert!(matches!(err, GalenaError::Mapping(_)));
    }

    #[test]
    fn test_merge_adds_timestamp() {
        let mut mappings = Mappings::new();
        let mut update = Mappings::new();
        update.set_property("city", Property::new(PropertyType::Text));

        mappings.merge(&update).unwrap();

        assert!(mappings.contains("city"));
        assert_eq!(
            mappings.get(TIMESTAMP_FIELD).unwrap().prop_type,
            PropertyType::Time
        );
    }

    #[test]
    fn test_roundtrip_serde() {
        let mut mappings = Mappings::new();
        mappings.set_property("city", Property::new(PropertyType::Text));
        mappings.ensure_timestamp();

        let json = serde_json::to_string(&mappings).unwrap();
        let back: Mappings = serde_json::from_str(&json).unwrap();
        assert_eq!(mappings, back);
    }
}
