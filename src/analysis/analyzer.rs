//! Analyzer pipeline combining char filters, a tokenizer, and token filters.
//!
//! Processing order: char filters normalize the raw text, the tokenizer
//! splits it, token filters transform the stream in declaration order.

use std::sync::Arc;

use crate::analysis::char_filter::CharFilter;
use crate::analysis::token::{Token, TokenStream};
use crate::analysis::token_filter::{LowercaseFilter, StopFilter, TokenFilter};
use crate::analysis::tokenizer::{
    KeywordTokenizer, LetterTokenizer, RegexpTokenizer, StandardTokenizer, Tokenizer,
    WebTokenizer, WhitespaceTokenizer,
};
use crate::error::Result;

/// A named analysis pipeline. Every analyzer has exactly one tokenizer.
#[derive(Clone)]
pub struct Analyzer {
    name: String,
    char_filters: Vec<Arc<dyn CharFilter>>,
    tokenizer: Arc<dyn Tokenizer>,
    token_filters: Vec<Arc<dyn TokenFilter>>,
}

impl Analyzer {
    /// Create a new analyzer with the given tokenizer and no filters.
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Analyzer {
            name: tokenizer.name().to_string(),
            tokenizer,
            char_filters: Vec::new(),
            token_filters: Vec::new(),
        }
    }

    /// Append a char filter to the pipeline.
    pub fn add_char_filter(mut self, filter: Arc<dyn CharFilter>) -> Self {
        self.char_filters.push(filter);
        self
    }

    /// Append a token filter to the pipeline.
    pub fn add_token_filter(mut self, filter: Arc<dyn TokenFilter>) -> Self {
        self.token_filters.push(filter);
        self
    }

    /// Set the analyzer name.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the full pipeline over `text`, dropping stopped tokens.
    pub fn analyze(&self, text: &str) -> Result<Vec<Token>> {
        let mut filtered = std::borrow::Cow::Borrowed(text);
        for char_filter in &self.char_filters {
            filtered = std::borrow::Cow::Owned(char_filter.filter(&filtered));
        }

        let mut tokens: TokenStream = self.tokenizer.tokenize(&filtered)?;
        for filter in &self.token_filters {
            tokens = filter.filter(tokens)?;
        }

        Ok(tokens.filter(|t| !t.is_stopped()).collect())
    }

    /// Analyze and return just the term strings.
    pub fn terms(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.analyze(text)?.into_iter().map(|t| t.text).collect())
    }

    // Built-in analyzers.

    /// Unicode word boundaries + lowercase.
    pub fn standard() -> Self {
        Analyzer::new(Arc::new(StandardTokenizer::new()))
            .add_token_filter(Arc::new(LowercaseFilter::new()))
            .with_name("standard")
    }

    /// Standard with an explicit stop word list.
    pub fn standard_with_stopwords(words: Vec<String>) -> Self {
        Analyzer::standard()
            .add_token_filter(Arc::new(StopFilter::from_words(words)))
            .with_name("standard")
    }

    /// Letter runs + lowercase.
    pub fn simple() -> Self {
        Analyzer::new(Arc::new(LetterTokenizer::new()))
            .add_token_filter(Arc::new(LowercaseFilter::new()))
            .with_name("simple")
    }

    /// The whole input as one exact token.
    pub fn keyword() -> Self {
        Analyzer::new(Arc::new(KeywordTokenizer::new())).with_name("keyword")
    }

    /// Whitespace splitting, no normalization.
    pub fn whitespace() -> Self {
        Analyzer::new(Arc::new(WhitespaceTokenizer::new())).with_name("whitespace")
    }

    /// Simple + stop words (default English list when none given).
    pub fn stop(words: Option<Vec<String>>) -> Self {
        let stop = match words {
            Some(w) if !w.is_empty() => StopFilter::from_words(w),
            _ => StopFilter::new(),
        };
        Analyzer::simple()
            .add_token_filter(Arc::new(stop))
            .with_name("stop")
    }

    /// Regex token extraction; `\w+` when no pattern given, lowercase by
    /// default.
    pub fn regexp(pattern: Option<&str>, lowercase: bool, stopwords: Vec<String>) -> Result<Self> {
        let tokenizer = match pattern {
            Some(p) if !p.is_empty() => RegexpTokenizer::with_pattern(p)?,
            _ => RegexpTokenizer::new()?,
        };
        let mut analyzer = Analyzer::new(Arc::new(tokenizer));
        if lowercase {
            analyzer = analyzer.add_token_filter(Arc::new(LowercaseFilter::new()));
        }
        if !stopwords.is_empty() {
            analyzer = analyzer.add_token_filter(Arc::new(StopFilter::from_words(stopwords)));
        }
        Ok(analyzer.with_name("regexp"))
    }

    /// URL/email aware tokenization + lowercase.
    pub fn web() -> Self {
        Analyzer::new(Arc::new(WebTokenizer::new()))
            .add_token_filter(Arc::new(LowercaseFilter::new()))
            .with_name("web")
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("tokenizer", &self.tokenizer.name())
            .field(
                "char_filters",
                &self.char_filters.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "token_filters",
                &self
                    .token_filters
                    .iter()
                    .map(|t| t.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::char_filter::PatternReplaceCharFilter;

    #[test]
    fn test_standard_analyzer_lowercases() {
        let analyzer = Analyzer::standard();
        let terms = analyzer.terms("Turin 2006!").unwrap();
        assert_eq!(terms, vec!["turin", "2006"]);
    }

    #[test]
    fn test_keyword_analyzer_is_exact() {
        let analyzer = Analyzer::keyword();
        let terms = analyzer.terms("New York").unwrap();
        assert_eq!(terms, vec!["New York"]);
    }

    #[test]
    fn test_stop_analyzer_removes_stopwords() {
        let analyzer = Analyzer::stop(None);
        let terms = analyzer.terms("the quick fox").unwrap();
        assert_eq!(terms, vec!["quick", "fox"]);
    }

    #[test]
    fn test_char_filter_runs_before_tokenizer() {
        let analyzer = Analyzer::standard()
            .add_char_filter(Arc::new(PatternReplaceCharFilter::new(r"-", " ").unwrap()));
        let terms = analyzer.terms("full-text").unwrap();
        assert_eq!(terms, vec!["full", "text"]);
    }

    #[test]
    fn test_regexp_defaults() {
        let analyzer = Analyzer::regexp(None, true, Vec::new()).unwrap();
        let terms = analyzer.terms("A-B").unwrap();
        assert_eq!(terms, vec!["a", "b"]);
    }
}
