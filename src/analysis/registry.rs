//! Builds named analyzers from declarative index configuration and resolves
//! analyzers by name or through field mappings at query time.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::char_filter::{CharFilter, MappingCharFilter, PatternReplaceCharFilter};
use crate::analysis::token_filter::{
    LengthFilter, LowercaseFilter, StopFilter, TokenFilter, TrimFilter, UppercaseFilter,
};
use crate::analysis::tokenizer::{
    EdgeNgramTokenizer, KeywordTokenizer, NgramTokenizer, RegexpTokenizer, StandardTokenizer,
    Tokenizer, WhitespaceTokenizer,
};
use crate::error::{GalenaError, Result};
use crate::mapping::{Mappings, PropertyType};

/// Declarative `analysis` section of index settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analyzer: HashMap<String, AnalyzerConfig>,
    #[serde(default)]
    pub tokenizer: HashMap<String, Value>,
    #[serde(default)]
    pub char_filter: HashMap<String, Value>,
    #[serde(default)]
    pub token_filter: HashMap<String, Value>,
    /// Alias for `token_filter`.
    #[serde(default)]
    pub filter: HashMap<String, Value>,
}

/// One named analyzer declaration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(rename = "type", default)]
    pub analyzer_type: Option<String>,
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub char_filter: Vec<String>,
    #[serde(default)]
    pub token_filter: Vec<String>,
    /// Alias for `token_filter`.
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub lowercase: Option<bool>,
    #[serde(default)]
    pub stopwords: Vec<String>,
}

/// Build the named analyzers for one index from its `analysis` config.
pub fn build_analyzers(config: &AnalysisConfig) -> Result<HashMap<String, Arc<Analyzer>>> {
    let user_char_filters = build_char_filters(&config.char_filter)?;
    let user_tokenizers = build_tokenizers(&config.tokenizer)?;

    // `filter` is accepted as an alias for `token_filter`.
    let mut filter_defs = config.token_filter.clone();
    for (name, def) in &config.filter {
        filter_defs.entry(name.clone()).or_insert_with(|| def.clone());
    }
    let user_token_filters = build_token_filters(&filter_defs)?;

    let mut analyzers = HashMap::new();
    for (name, decl) in &config.analyzer {
        let analyzer = build_one(
            name,
            decl,
            &user_char_filters,
            &user_tokenizers,
            &user_token_filters,
        )?;
        analyzers.insert(name.clone(), Arc::new(analyzer.with_name(name.clone())));
    }

    Ok(analyzers)
}

fn build_one(
    name: &str,
    decl: &AnalyzerConfig,
    user_char_filters: &HashMap<String, Arc<dyn CharFilter>>,
    user_tokenizers: &HashMap<String, Arc<dyn Tokenizer>>,
    user_token_filters: &HashMap<String, Arc<dyn TokenFilter>>,
) -> Result<Analyzer> {
    let type_name = decl
        .analyzer_type
        .as_deref()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty() && t != "custom");

    if decl.tokenizer.as_deref().unwrap_or("").is_empty() && type_name.is_none() {
        return Err(GalenaError::parsing(format!(
            "[analyzer] [{name}] is missing tokenizer"
        )));
    }

    // A declared type selects a built-in constructor.
    let mut analyzer = match type_name.as_deref() {
        Some("regexp") | Some("pattern") => Some(Analyzer::regexp(
            decl.pattern.as_deref(),
            decl.lowercase.unwrap_or(true),
            decl.stopwords.clone(),
        )?),
        Some("standard") => Some(if decl.stopwords.is_empty() {
            Analyzer::standard()
        } else {
            Analyzer::standard_with_stopwords(decl.stopwords.clone())
        }),
        Some("stop") => Some(Analyzer::stop(Some(decl.stopwords.clone()))),
        Some("whitespace") => Some(Analyzer::whitespace()),
        Some("keyword") => Some(Analyzer::keyword()),
        Some("simple") => Some(Analyzer::simple()),
        Some("web") => Some(Analyzer::web()),
        Some(other) => {
            return Err(GalenaError::parsing(format!(
                "[analyzer] build-in [{other}] doesn't support custom"
            )));
        }
        None => None,
    };

    // Otherwise compose from the named tokenizer, built-in first then
    // user-defined.
    if analyzer.is_none() {
        let tokenizer_name = decl.tokenizer.as_deref().unwrap_or("");
        let tokenizer = match builtin_tokenizer(tokenizer_name)? {
            Some(t) => t,
            None => user_tokenizers
                .get(tokenizer_name)
                .cloned()
                .ok_or_else(|| {
                    GalenaError::parsing(format!(
                        "[analyzer] [{name}] used undefined tokenizer [{tokenizer_name}]"
                    ))
                })?,
        };
        analyzer = Some(Analyzer::new(tokenizer));
    }
    let mut analyzer = analyzer.expect("analyzer resolved above");

    for filter_name in &decl.char_filter {
        let filter = match user_char_filters.get(filter_name) {
            Some(f) => f.clone(),
            None => builtin_char_filter(filter_name)?.ok_or_else(|| {
                GalenaError::parsing(format!(
                    "[analyzer] [{name}] used undefined char_filter [{filter_name}]"
                ))
            })?,
        };
        analyzer = analyzer.add_char_filter(filter);
    }

    let mut token_filter_names = decl.token_filter.clone();
    if token_filter_names.is_empty() {
        token_filter_names = decl.filter.clone();
    }
    for filter_name in &token_filter_names {
        let filter = match user_token_filters.get(filter_name) {
            Some(f) => f.clone(),
            None => builtin_token_filter(filter_name).ok_or_else(|| {
                GalenaError::parsing(format!(
                    "[analyzer] [{name}] used undefined token_filter [{filter_name}]"
                ))
            })?,
        };
        analyzer = analyzer.add_token_filter(filter);
    }

    Ok(analyzer)
}

/// Resolve an analyzer by name: user-defined first, then built-ins.
pub fn resolve(
    analyzers: &HashMap<String, Arc<Analyzer>>,
    name: &str,
) -> Result<Arc<Analyzer>> {
    let name = if name.is_empty() { "default" } else { name };

    if let Some(analyzer) = analyzers.get(name) {
        return Ok(analyzer.clone());
    }

    match name {
        "standard" => Ok(Arc::new(Analyzer::standard())),
        "simple" => Ok(Arc::new(Analyzer::simple())),
        "keyword" => Ok(Arc::new(Analyzer::keyword())),
        "whitespace" => Ok(Arc::new(Analyzer::whitespace())),
        "stop" => Ok(Arc::new(Analyzer::stop(None))),
        "regexp" | "pattern" => Ok(Arc::new(Analyzer::regexp(None, true, Vec::new())?)),
        "web" => Ok(Arc::new(Analyzer::web())),
        _ => Err(GalenaError::parsing(format!(
            "[analyzer] [{name}] doesn't exists"
        ))),
    }
}

/// Resolve the (index-time, search-time) analyzer pair for a field.
///
/// Non-text fields receive no analyzer. The search analyzer falls back to
/// the index-time analyzer when not declared.
pub fn resolve_for_field(
    analyzers: &HashMap<String, Arc<Analyzer>>,
    mappings: &Mappings,
    field: &str,
) -> (Option<Arc<Analyzer>>, Option<Arc<Analyzer>>) {
    if field.is_empty() {
        return (None, None);
    }

    let mut analyzer_name = String::new();
    let mut search_analyzer_name = String::new();
    if let Some(prop) = mappings.get(field) {
        if prop.prop_type != PropertyType::Text {
            return (None, None);
        }
        if let Some(name) = &prop.analyzer {
            analyzer_name = name.clone();
        }
        if let Some(name) = &prop.search_analyzer {
            search_analyzer_name = name.clone();
        }
    }
    if search_analyzer_name.is_empty() {
        search_analyzer_name = analyzer_name.clone();
    }

    let index_analyzer = resolve(analyzers, &analyzer_name).ok();
    let search_analyzer = resolve(analyzers, &search_analyzer_name).ok();

    (index_analyzer, search_analyzer)
}

fn builtin_tokenizer(name: &str) -> Result<Option<Arc<dyn Tokenizer>>> {
    Ok(match name {
        "standard" => Some(Arc::new(StandardTokenizer::new())),
        "whitespace" => Some(Arc::new(WhitespaceTokenizer::new())),
        "keyword" => Some(Arc::new(KeywordTokenizer::new())),
        "regexp" | "pattern" => Some(Arc::new(RegexpTokenizer::new()?)),
        "ngram" => Some(Arc::new(NgramTokenizer::new(1, 2)?)),
        "edge_ngram" => Some(Arc::new(EdgeNgramTokenizer::new(1, 2)?)),
        _ => None,
    })
}

fn builtin_char_filter(_name: &str) -> Result<Option<Arc<dyn CharFilter>>> {
    // Char filters always need configuration; there are no bare-name built-ins.
    Ok(None)
}

fn builtin_token_filter(name: &str) -> Option<Arc<dyn TokenFilter>> {
    match name {
        "lowercase" => Some(Arc::new(LowercaseFilter::new())),
        "uppercase" => Some(Arc::new(UppercaseFilter::new())),
        "stop" => Some(Arc::new(StopFilter::new())),
        "trim" => Some(Arc::new(TrimFilter::new())),
        _ => None,
    }
}

fn build_tokenizers(defs: &HashMap<String, Value>) -> Result<HashMap<String, Arc<dyn Tokenizer>>> {
    let mut out: HashMap<String, Arc<dyn Tokenizer>> = HashMap::new();
    for (name, def) in defs {
        let type_name = string_option(def, "type").ok_or_else(|| {
            GalenaError::parsing(format!("[tokenizer] [{name}] is missing type"))
        })?;
        let tokenizer: Arc<dyn Tokenizer> = match type_name.as_str() {
            "standard" => Arc::new(StandardTokenizer::new()),
            "whitespace" => Arc::new(WhitespaceTokenizer::new()),
            "keyword" => Arc::new(KeywordTokenizer::new()),
            "regexp" | "pattern" => match string_option(def, "pattern") {
                Some(pattern) => Arc::new(RegexpTokenizer::with_pattern(&pattern)?),
                None => Arc::new(RegexpTokenizer::new()?),
            },
            "ngram" => Arc::new(NgramTokenizer::new(
                usize_option(def, "min_gram").unwrap_or(1),
                usize_option(def, "max_gram").unwrap_or(2),
            )?),
            "edge_ngram" => Arc::new(EdgeNgramTokenizer::new(
                usize_option(def, "min_gram").unwrap_or(1),
                usize_option(def, "max_gram").unwrap_or(2),
            )?),
            other => {
                return Err(GalenaError::parsing(format!(
                    "[tokenizer] [{name}] doesn't support type [{other}]"
                )));
            }
        };
        out.insert(name.clone(), tokenizer);
    }
    Ok(out)
}

fn build_char_filters(
    defs: &HashMap<String, Value>,
) -> Result<HashMap<String, Arc<dyn CharFilter>>> {
    let mut out: HashMap<String, Arc<dyn CharFilter>> = HashMap::new();
    for (name, def) in defs {
        let type_name = string_option(def, "type").ok_or_else(|| {
            GalenaError::parsing(format!("[char_filter] [{name}] is missing type"))
        })?;
        let filter: Arc<dyn CharFilter> = match type_name.as_str() {
            "mapping" => {
                let rules = string_list(def, "mappings");
                Arc::new(MappingCharFilter::from_rules(rules)?)
            }
            "pattern_replace" => {
                let pattern = string_option(def, "pattern").unwrap_or_default();
                let replacement = string_option(def, "replacement").unwrap_or_default();
                Arc::new(PatternReplaceCharFilter::new(&pattern, &replacement)?)
            }
            other => {
                return Err(GalenaError::parsing(format!(
                    "[char_filter] [{name}] doesn't support type [{other}]"
                )));
            }
        };
        out.insert(name.clone(), filter);
    }
    Ok(out)
}

fn build_token_filters(
    defs: &HashMap<String, Value>,
) -> Result<HashMap<String, Arc<dyn TokenFilter>>> {
    let mut out: HashMap<String, Arc<dyn TokenFilter>> = HashMap::new();
    for (name, def) in defs {
        let type_name = string_option(def, "type").ok_or_else(|| {
            GalenaError::parsing(format!("[token_filter] [{name}] is missing type"))
        })?;
        let filter: Arc<dyn TokenFilter> = match type_name.as_str() {
            "lowercase" => Arc::new(LowercaseFilter::new()),
            "uppercase" => Arc::new(UppercaseFilter::new()),
            "trim" => Arc::new(TrimFilter::new()),
            "stop" => {
                let words = string_list(def, "stopwords");
                if words.is_empty() {
                    Arc::new(StopFilter::new())
                } else {
                    Arc::new(StopFilter::from_words(words))
                }
            }
            "length" => Arc::new(LengthFilter::new(
                usize_option(def, "min").unwrap_or(0),
                usize_option(def, "max").unwrap_or(usize::MAX),
            )),
            other => {
                return Err(GalenaError::parsing(format!(
                    "[token_filter] [{name}] doesn't support type [{other}]"
                )));
            }
        };
        out.insert(name.clone(), filter);
    }
    Ok(out)
}

fn string_option(def: &Value, key: &str) -> Option<String> {
    def.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn usize_option(def: &Value, key: &str) -> Option<usize> {
    def.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn string_list(def: &Value, key: &str) -> Vec<String> {
    def.get(key)
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
    use crate::mapping::Property;
    use serde_json::json;

    fn parse_config(value: Value) -> AnalysisConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_composed_analyzer() {
        let config = parse_config(json!({
            "analyzer": {
                "my_analyzer": {
                    "tokenizer": "whitespace",
                    "token_filter": ["lowercase"]
                }
            }
        }));

        let analyzers = build_analyzers(&config).unwrap();
        let terms = analyzers["my_analyzer"].terms("Foo BAR").unwrap();
        assert_eq!(terms, vec!["foo", "bar"]);
    }

    #[test]
    fn test_missing_tokenizer_is_parsing_error() {
        let config = parse_config(json!({
            "analyzer": { "broken": { "token_filter": ["lowercase"] } }
        }));

        let err = build_analyzers(&config).unwrap_err();
        assert!(err.to_string().contains("missing tokenizer"));
    }

    #[test]
    fn test_undefined_tokenizer_is_parsing_error() {
        let config = parse_config(json!({
            "analyzer": { "broken": { "tokenizer": "nope" } }
        }));

        let err = build_analyzers(&config).unwrap_err();
        assert!(err.to_string().contains("undefined tokenizer"));
    }

    #[test]
    fn test_typed_analyzer_with_user_filters() {
        let config = parse_config(json!({
            "analyzer": {
                "shouty": {
                    "type": "whitespace",
                    "filter": ["upper"]
                }
            },
            "token_filter": {
                "upper": { "type": "uppercase" }
            }
        }));

        let analyzers = build_analyzers(&config).unwrap();
        let terms = analyzers["shouty"].terms("be loud").unwrap();
        assert_eq!(terms, vec!["BE", "LOUD"]);
    }

    #[test]
    fn test_user_char_filter_lookup() {
        let config = parse_config(json!({
            "analyzer": {
                "cleaned": {
                    "tokenizer": "standard",
                    "char_filter": ["strip_dashes"]
                }
            },
            "char_filter": {
                "strip_dashes": { "type": "pattern_replace", "pattern": "-", "replacement": " " }
            }
        }));

        let analyzers = build_analyzers(&config).unwrap();
        let terms = analyzers["cleaned"].terms("full-text").unwrap();
        assert_eq!(terms, vec!["full", "text"]);
    }

    #[test]
    fn test_resolve_builtin_and_unknown() {
        let analyzers = HashMap::new();
        assert!(resolve(&analyzers, "standard").is_ok());
        assert!(resolve(&analyzers, "keyword").is_ok());
        assert!(resolve(&analyzers, "default").is_err());
        assert!(resolve(&analyzers, "nope").is_err());
    }

    #[test]
    fn test_resolve_for_field_non_text_gets_none() {
        let analyzers = HashMap::new();
        let mut mappings = Mappings::new();
        mappings.set_property("year", Property::new(PropertyType::Numeric));

        let (index, search) = resolve_for_field(&analyzers, &mappings, "year");
        assert!(index.is_none());
        assert!(search.is_none());
    }

    #[test]
    fn test_search_analyzer_defaults_to_index_analyzer() {
        let config = parse_config(json!({
            "analyzer": { "exact": { "type": "keyword" } }
        }));
        let analyzers = build_analyzers(&config).unwrap();

        let mut mappings = Mappings::new();
        let mut prop = Property::new(PropertyType::Text);
        prop.analyzer = Some("exact".to_string());
        mappings.set_property("tag", prop);

        let (index, search) = resolve_for_field(&analyzers, &mappings, "tag");
        assert_eq!(index.unwrap().name(), "exact");
        assert_eq!(search.unwrap().name(), "exact");
    }
}
