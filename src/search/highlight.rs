//! Hit highlighting: wraps query terms found in stored field values.

use regex::RegexBuilder;

use crate::dsl::HighlightSpec;
use crate::index::reader::DocumentMatch;
use crate::index::IndexQuery;

/// Fill a completed match's highlight map for the requested fields.
pub fn apply(spec: &HighlightSpec, query: &IndexQuery, doc: &mut DocumentMatch) {
    if spec.fields.is_empty() {
        return;
    }

    for field in &spec.fields {
        let mut terms = Vec::new();
        collect_terms(query, field, &mut terms);
        if terms.is_empty() {
            continue;
        }

        let pattern = format!(
            r"\b({})\b",
            terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|")
        );
        let Ok(regex) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
            continue;
        };

        let fragments: Vec<String> = doc
            .values(field)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.to_display())
                    .filter(|text| regex.is_match(text))
                    .map(|text| {
                        regex
                            .replace_all(&text, format!("{}$1{}", spec.pre_tag, spec.post_tag))
                            .into_owned()
                    })
                    .collect()
            })
            .unwrap_or_default();

        if !fragments.is_empty() {
            doc.highlight.insert(field.clone(), fragments);
        }
    }
}

/// Collect the literal terms a query matches against one field.
fn collect_terms(query: &IndexQuery, field: &str, out: &mut Vec<String>) {
    match query {
        IndexQuery::Term { field: f, value } if f == field => out.push(value.clone()),
        IndexQuery::Phrase { field: f, terms } | IndexQuery::PhrasePrefix { field: f, terms }
            if f == field =>
        {
            out.extend(terms.iter().cloned());
        }
        IndexQuery::Prefix { field: f, value } | IndexQuery::Fuzzy { field: f, value, .. }
            if f == field =>
        {
            out.push(value.clone());
        }
        IndexQuery::Bool {
            must,
            should,
            filter,
            ..
        } => {
            for clause in must.iter().chain(should.iter()).chain(filter.iter()) {
                collect_terms(clause, field, out);
            }
        }
        IndexQuery::Boost { query, .. } => collect_terms(query, field, out),
        IndexQuery::Boosting { positive, .. } => collect_terms(positive, field, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::index::field::{Document, Field};
    use crate::index::reader::IndexReader;
    use crate::index::Segment;
    use std::sync::Arc;

    fn match_for(city: &str) -> DocumentMatch {
        let analyzer = Analyzer::standard();
        let mut segment = Segment::new();
        let mut doc = Document::new("1");
        doc.add_field(Field::text("City", city, &analyzer).unwrap());
        segment.insert(doc);
        IndexReader::new(Arc::new(segment))
            .matches(&IndexQuery::MatchAll, &vec![])
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_highlight_wraps_terms() {
        let spec = HighlightSpec {
            fields: vec!["City".to_string()],
            pre_tag: "<mark>".to_string(),
            post_tag: "</mark>".to_string(),
        };
        let query = IndexQuery::Term {
            field: "City".to_string(),
            value: "turin".to_string(),
        };

        let mut doc = match_for("Turin is lovely");
        apply(&spec, &query, &mut doc);

        assert_eq!(
            doc.highlight["City"],
            vec!["<mark>Turin</mark> is lovely".to_string()]
        );
    }

    #[test]
    fn test_no_match_no_fragment() {
        let spec = HighlightSpec {
            fields: vec!["City".to_string()],
            pre_tag: "<mark>".to_string(),
            post_tag: "</mark>".to_string(),
        };
        let query = IndexQuery::Term {
            field: "City".to_string(),
            value: "athens".to_string(),
        };

        let mut doc = match_for("Turin");
        apply(&spec, &query, &mut doc);
        assert!(doc.highlight.is_empty());
    }
}
