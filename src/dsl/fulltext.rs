//! Full-text query parsers: the match family, multi-field variants, and the
//! query-string mini language.

use serde_json::Value;

use crate::dsl::termlevel::{with_boost, DEFAULT_FUZZINESS};
use crate::dsl::Context;
use crate::document::ALL_FIELD;
use crate::error::{GalenaError, Result};
use crate::index::IndexQuery;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Or,
    And,
}

fn parse_operator(spec: &Value) -> Result<Operator> {
    match spec.get("operator").and_then(Value::as_str) {
        None => Ok(Operator::Or),
        Some(op) if op.eq_ignore_ascii_case("or") => Ok(Operator::Or),
        Some(op) if op.eq_ignore_ascii_case("and") => Ok(Operator::And),
        Some(other) => Err(GalenaError::parsing(format!(
            "operator doesn't support value [{other}]"
        ))),
    }
}

/// Pull the single `field: spec` pair out of a match-style clause body.
fn single_field(body: &Value) -> Result<(&String, &Value)> {
    let Value::Object(map) = body else {
        return Err(GalenaError::parsing("expected an object"));
    };
    let mut entries = map.iter();
    let first = entries
        .next()
        .ok_or_else(|| GalenaError::parsing("missing field"))?;
    if entries.next().is_some() {
        return Err(GalenaError::parsing("supports only one field per clause"));
    }
    Ok(first)
}

fn query_text(spec: &Value) -> Result<String> {
    let raw = match spec {
        Value::Object(map) => map.get("query").unwrap_or(spec),
        other => other,
    };
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(GalenaError::parsing(format!(
            "query doesn't support value {other}"
        ))),
    }
}

fn clause_analyzer(spec: &Value) -> Option<&str> {
    spec.get("analyzer").and_then(Value::as_str)
}

/// Combine per-term queries according to the clause operator.
fn combine(terms: Vec<IndexQuery>, operator: Operator) -> IndexQuery {
    if terms.len() == 1 {
        return terms.into_iter().next().expect("single element");
    }
    match operator {
        Operator::Or => IndexQuery::Bool {
            must: vec![],
            should: terms,
            must_not: vec![],
            filter: vec![],
            minimum_should_match: 1,
        },
        Operator::And => IndexQuery::Bool {
            must: terms,
            should: vec![],
            must_not: vec![],
            filter: vec![],
            minimum_should_match: 0,
        },
    }
}

pub fn match_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let text = query_text(spec)?;
    let operator = parse_operator(spec)?;
    let analyzer = ctx.search_analyzer(field, clause_analyzer(spec))?;
    let terms = analyzer.terms(&text)?;

    if terms.is_empty() {
        return Ok(IndexQuery::MatchNone);
    }

    let fuzziness = match spec.get("fuzziness") {
        None => None,
        Some(Value::Number(n)) => Some(n.as_u64().unwrap_or(DEFAULT_FUZZINESS as u64) as u32),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") => Some(DEFAULT_FUZZINESS),
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "fuzziness doesn't support value {other}"
            )));
        }
    };

    let term_queries: Vec<IndexQuery> = terms
        .into_iter()
        .map(|value| match fuzziness {
            Some(fuzziness) => IndexQuery::Fuzzy {
                field: field.clone(),
                value,
                fuzziness,
                prefix_length: 0,
            },
            None => IndexQuery::Term {
                field: field.clone(),
                value,
            },
        })
        .collect();

    Ok(with_boost(combine(term_queries, operator), spec))
}

pub fn match_bool_prefix_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let text = query_text(spec)?;
    let analyzer = ctx.search_analyzer(field, clause_analyzer(spec))?;
    let mut terms = analyzer.terms(&text)?;

    let Some(last) = terms.pop() else {
        return Ok(IndexQuery::MatchNone);
    };

    let mut clauses: Vec<IndexQuery> = terms
        .into_iter()
        .map(|value| IndexQuery::Term {
            field: field.clone(),
            value,
        })
        .collect();
    clauses.push(IndexQuery::Prefix {
        field: field.clone(),
        value: last,
    });

    Ok(combine(clauses, Operator::Or))
}

pub fn match_phrase_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let text = query_text(spec)?;
    let analyzer = ctx.search_analyzer(field, clause_analyzer(spec))?;
    let terms = analyzer.terms(&text)?;

    if terms.is_empty() {
        return Ok(IndexQuery::MatchNone);
    }
    Ok(IndexQuery::Phrase {
        field: field.clone(),
        terms,
    })
}

pub fn match_phrase_prefix_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let (field, spec) = single_field(body)?;
    let text = query_text(spec)?;
    let analyzer = ctx.search_analyzer(field, clause_analyzer(spec))?;
    let terms = analyzer.terms(&text)?;

    if terms.is_empty() {
        return Ok(IndexQuery::MatchNone);
    }
    Ok(IndexQuery::PhrasePrefix {
        field: field.clone(),
        terms,
    })
}

pub fn multi_match_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    let text = body
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| GalenaError::parsing("[multi_match] is missing query"))?;
    let fields = string_list(body, "fields");
    let fields = if fields.is_empty() {
        vec![ALL_FIELD.to_string()]
    } else {
        fields
    };
    let operator = parse_operator(body)?;

    let mut per_field = Vec::with_capacity(fields.len());
    for field in &fields {
        let analyzer = ctx.search_analyzer(field, clause_analyzer(body))?;
        let terms = analyzer.terms(text)?;
        if terms.is_empty() {
            continue;
        }
        let term_queries = terms
            .into_iter()
            .map(|value| IndexQuery::Term {
                field: field.clone(),
                value,
            })
            .collect();
        per_field.push(combine(term_queries, operator));
    }

    if per_field.is_empty() {
        return Ok(IndexQuery::MatchNone);
    }
    Ok(combine(per_field, Operator::Or))
}

pub fn combined_fields_query(ctx: &Context, body: &Value) -> Result<IndexQuery> {
    // Same shape as multi_match; term-centric scoring is not modeled.
    multi_match_query(ctx, body)
}

/// `query_string` and its lenient `simple_query_string` sibling.
///
/// Supports `field:term`, quoted phrases, and `+`/`-` prefixes; terms are
/// analyzed against their target field.
pub fn query_string_query(ctx: &Context, body: &Value, lenient: bool) -> Result<IndexQuery> {
    let text = body
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| GalenaError::parsing("is missing query"))?;
    let default_field = body
        .get("default_field")
        .and_then(Value::as_str)
        .unwrap_or(ALL_FIELD)
        .to_string();
    let default_and = body
        .get("default_operator")
        .and_then(Value::as_str)
        .map(|op| op.eq_ignore_ascii_case("and"))
        .unwrap_or(false);

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    let mut should = Vec::new();

    for raw_token in tokenize_query_string(text) {
        let (occur, token) = match raw_token.strip_prefix('+') {
            Some(rest) => (Some(true), rest.to_string()),
            None => match raw_token.strip_prefix('-') {
                Some(rest) => (Some(false), rest.to_string()),
                None => (None, raw_token),
            },
        };
        if token.is_empty() {
            continue;
        }

        let (field, value) = match token.split_once(':') {
            Some((f, v)) if !f.is_empty() && !v.is_empty() => (f.to_string(), v.to_string()),
            Some(_) if !lenient => {
                return Err(GalenaError::parsing(format!(
                    "malformed token [{token}]"
                )));
            }
            Some(_) => continue,
            None => (default_field.clone(), token),
        };

        let quoted = value.starts_with('"') && value.ends_with('"') && value.len() >= 2;
        let value = value.trim_matches('"').to_string();
        let analyzer = ctx.search_analyzer(&field, None)?;
        let terms = analyzer.terms(&value)?;
        if terms.is_empty() {
            continue;
        }

        let sub = if quoted && terms.len() > 1 {
            IndexQuery::Phrase {
                field: field.clone(),
                terms,
            }
        } else {
            combine(
                terms
                    .into_iter()
                    .map(|value| IndexQuery::Term {
                        field: field.clone(),
                        value,
                    })
                    .collect(),
                Operator::Or,
            )
        };

        match occur {
            Some(true) => must.push(sub),
            Some(false) => must_not.push(sub),
            None if default_and => must.push(sub),
            None => should.push(sub),
        }
    }

    if must.is_empty() && should.is_empty() && must_not.is_empty() {
        return Ok(IndexQuery::MatchNone);
    }
    Ok(IndexQuery::Bool {
        must,
        should,
        must_not,
        filter: vec![],
        minimum_should_match: 0,
    })
}

/// Split on whitespace but keep quoted phrases (and their `field:"..."`
/// prefixes) together.
fn tokenize_query_string(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn string_list(body: &Value, key: &str) -> Vec<String> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mappings;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx_fixture() -> (Mappings, HashMap<String, std::sync::Arc<crate::analysis::Analyzer>>) {
        (Mappings::new(), HashMap::new())
    }

    #[test]
    fn test_match_shorthand_analyzes() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = match_query(&ctx, &json!({"City": "Turin Games"})).unwrap();

        // Two analyzed terms combined with OR.
        match q {
            IndexQuery::Bool { should, .. } => {
                assert_eq!(should.len(), 2);
                assert!(
                    matches!(&should[0], IndexQuery::Term { value, .. } if value == "turin")
                );
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_match_operator_and() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = match_query(
            &ctx,
            &json!({"City": {"query": "Turin Games", "operator": "and"}}),
        )
        .unwrap();

        assert!(matches!(q, IndexQuery::Bool { ref must, .. } if must.len() == 2));
    }

    #[test]
    fn test_match_phrase() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = match_phrase_query(&ctx, &json!({"City": "New York"})).unwrap();
        assert!(matches!(q, IndexQuery::Phrase { ref terms, .. } if terms.len() == 2));
    }

    #[test]
    fn test_query_string_syntax() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = query_string_query(
            &ctx,
            &json!({"query": "+City:turin -knitting games"}),
            false,
        )
        .unwrap();

        match q {
            IndexQuery::Bool {
                must,
                must_not,
                should,
                ..
            } => {
                assert_eq!(must.len(), 1);
                assert_eq!(must_not.len(), 1);
                assert_eq!(should.len(), 1);
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_query_string_quoted_phrase() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q =
            query_string_query(&ctx, &json!({"query": "\"new york\""}), false).unwrap();
        match q {
            IndexQuery::Bool { should, .. } => {
                assert!(matches!(&should[0], IndexQuery::Phrase { .. }));
            }
            _ => panic!("expected bool"),
        }
    }

    #[test]
    fn test_multi_match_defaults_to_all_field() {
        let (mappings, analyzers) = ctx_fixture();
        let ctx = Context {
            mappings: &mappings,
            analyzers: &analyzers,
        };
        let q = multi_match_query(&ctx, &json!({"query": "turin"})).unwrap();
        assert!(matches!(q, IndexQuery::Term { ref field, .. } if field == ALL_FIELD));
    }
}
