//! Regex-based tokenizer implementation.

use std::sync::Arc;

use regex::Regex;

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::Tokenizer;
use crate::error::{GalenaError, Result};

/// Default token pattern when none is configured.
pub const DEFAULT_PATTERN: &str = r"\w+";

/// A tokenizer that extracts tokens matching a regular expression.
///
/// The pattern is compiled once at construction time.
#[derive(Clone, Debug)]
pub struct RegexpTokenizer {
    pattern: Arc<Regex>,
}

impl RegexpTokenizer {
    /// Create a new regexp tokenizer with the default `\w+` pattern.
    pub fn new() -> Result<Self> {
        Self::with_pattern(DEFAULT_PATTERN)
    }

    /// Create a new regexp tokenizer with a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            GalenaError::parsing(format!("[tokenizer] regexp pattern is invalid: {e}"))
        })?;

        Ok(RegexpTokenizer {
            pattern: Arc::new(regex),
        })
    }

    /// Get the pattern used by this tokenizer.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Tokenizer for RegexpTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = self
            .pattern
            .find_iter(text)
            .enumerate()
            .map(|(position, mat)| {
                Token::with_offsets(mat.as_str(), position, mat.start(), mat.end())
            })
            .collect();

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "regexp"
    }
}
