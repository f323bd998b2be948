//! Case-folding filters.

use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::TokenFilter;
use crate::error::Result;

/// A filter that converts token text to lowercase.
///
/// Skips tokens marked as stopped; positions and offsets are preserved.
#[derive(Clone, Debug, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    /// Create a new lowercase filter.
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let filtered: Vec<_> = tokens
            .map(|token| {
                if token.is_stopped() {
                    token
                } else {
                    let text = token.text.to_lowercase();
                    token.with_text(text)
                }
            })
            .collect();

        Ok(Box::new(filtered.into_iter()))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// A filter that converts token text to uppercase.
#[derive(Clone, Debug, Default)]
pub struct UppercaseFilter;

impl UppercaseFilter {
    pub fn new() -> Self {
        UppercaseFilter
    }
}

impl TokenFilter for UppercaseFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let filtered: Vec<_> = tokens
            .map(|token| {
                if token.is_stopped() {
                    token
                } else {
                    let text = token.text.to_uppercase();
                    token.with_text(text)
                }
            })
            .collect();

        Ok(Box::new(filtered.into_iter()))
    }

    fn name(&self) -> &'static str {
        "uppercase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;

    #[test]
    fn test_lowercase_filter() {
        let filter = LowercaseFilter::new();
        let tokens = vec![
            Token::new("Hello", 0),
            Token::new("WORLD", 1),
            Token::new("Keep", 2).stop(),
        ];

        let result: Vec<Token> = filter
            .filter(Box::new(tokens.into_iter()))
            .unwrap()
            .collect();

        assert_eq!(result[0].text, "hello");
        assert_eq!(result[1].text, "world");
        assert_eq!(result[2].text, "Keep");
    }

    #[test]
    fn test_uppercase_filter() {
        let filter = UppercaseFilter::new();
        let tokens = vec![Token::new("loud", 0)];

        let result: Vec<Token> = filter
            .filter(Box::new(tokens.into_iter()))
            .unwrap()
            .collect();

        assert_eq!(result[0].text, "LOUD");
    }
}
