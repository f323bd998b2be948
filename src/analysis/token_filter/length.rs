//! Length filter implementation.

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::token_filter::TokenFilter;
use crate::error::Result;

/// A filter that drops tokens whose character length falls outside a window.
#[derive(Clone, Debug)]
pub struct LengthFilter {
    min: usize,
    max: usize,
}

impl LengthFilter {
    /// Create a new length filter keeping tokens with `min <= len <= max`.
    pub fn new(min: usize, max: usize) -> Self {
        LengthFilter { min, max }
    }
}

impl Default for LengthFilter {
    fn default() -> Self {
        LengthFilter {
            min: 0,
            max: usize::MAX,
        }
    }
}

impl TokenFilter for LengthFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let (min, max) = (self.min, self.max);
        let filtered: Vec<Token> = tokens
            .filter(|token| {
                if token.is_stopped() {
                    return true;
                }
                let len = token.text.chars().count();
                len >= min && len <= max
            })
            .collect();

        Ok(Box::new(filtered.into_iter()))
    }

    fn name(&self) -> &'static str {
        "length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_filter_window() {
        let filter = LengthFilter::new(2, 4);
        let tokens = vec![
            Token::new("a", 0),
            Token::new("ab", 1),
            Token::new("abcd", 2),
            Token::new("abcde", 3),
        ];

        let texts: Vec<String> = filter
            .filter(Box::new(tokens.into_iter()))
            .unwrap()
            .map(|t| t.text)
            .collect();

        assert_eq!(texts, vec!["ab", "abcd"]);
    }
}
