//! Typed field construction for indexable documents.

use crate::analysis::{Analyzer, Token};
use crate::error::Result;

/// The typed payload of a field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Analyzed text: the raw string plus its token stream.
    Text { raw: String, tokens: Vec<Token> },
    /// Double-precision numeric value.
    Numeric(f64),
    /// Exact-match string.
    Keyword(String),
    /// Milliseconds since epoch.
    Time(i64),
    /// Raw bytes, stored but not indexed.
    Stored(Vec<u8>),
}

/// One typed field of a document, with its index-time flags.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub store: bool,
    pub sortable: bool,
    pub aggregatable: bool,
    pub highlightable: bool,
}

impl Field {
    fn with_value(name: &str, value: FieldValue) -> Self {
        Field {
            name: name.to_string(),
            value,
            store: false,
            sortable: false,
            aggregatable: false,
            highlightable: false,
        }
    }

    /// A tokenized text field with positions, analyzed by `analyzer`.
    pub fn text(name: &str, raw: &str, analyzer: &Analyzer) -> Result<Self> {
        let tokens = analyzer.analyze(raw)?;
        Ok(Field::with_value(
            name,
            FieldValue::Text {
                raw: raw.to_string(),
                tokens,
            },
        ))
    }

    /// A text field from pre-analyzed tokens (used for composite fields).
    pub fn text_from_tokens(name: &str, raw: String, tokens: Vec<Token>) -> Self {
        Field::with_value(name, FieldValue::Text { raw, tokens })
    }

    /// A double-precision numeric field.
    pub fn numeric(name: &str, value: f64) -> Self {
        Field::with_value(name, FieldValue::Numeric(value))
    }

    /// An exact-match keyword field.
    pub fn keyword(name: &str, value: &str) -> Self {
        Field::with_value(name, FieldValue::Keyword(value.to_string()))
    }

    /// A time field holding epoch milliseconds.
    pub fn time(name: &str, millis: i64) -> Self {
        Field::with_value(name, FieldValue::Time(millis))
    }

    /// A stored-only field; never indexed.
    pub fn stored_only(name: &str, bytes: Vec<u8>) -> Self {
        Field::with_value(name, FieldValue::Stored(bytes))
    }

    pub fn store_value(mut self) -> Self {
        self.store = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn aggregatable(mut self) -> Self {
        self.aggregatable = true;
        self
    }

    pub fn highlight_matches(mut self) -> Self {
        self.highlightable = true;
        self
    }
}

/// A typed document ready to be handed to a shard writer.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub fields: Vec<Field>,
}

impl Document {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Document {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_field_is_analyzed() {
        let analyzer = Analyzer::standard();
        let field = Field::text("title", "Hello World", &analyzer).unwrap();

        match &field.value {
            FieldValue::Text { tokens, .. } => {
                assert_eq!(tokens.len(), 2);
                assert_eq!(tokens[0].text, "hello");
            }
            _ => panic!("expected text value"),
        }
    }

    #[test]
    fn test_flag_builders() {
        let field = Field::numeric("year", 2006.0).store_value().sortable();
        assert!(field.store);
        assert!(field.sortable);
        assert!(!field.aggregatable);
    }
}
