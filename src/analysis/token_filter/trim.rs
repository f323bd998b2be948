//! Trim filter implementation.

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::token_filter::TokenFilter;
use crate::error::Result;

/// A filter that trims leading and trailing whitespace from token text and
/// drops tokens that become empty.
#[derive(Clone, Debug, Default)]
pub struct TrimFilter;

impl TrimFilter {
    pub fn new() -> Self {
        TrimFilter
    }
}

impl TokenFilter for TrimFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        let filtered: Vec<Token> = tokens
            .filter_map(|token| {
                if token.is_stopped() {
                    return Some(token);
                }
                let trimmed = token.text.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.len() == token.text.len() {
                    Some(token)
                } else {
                    let text = trimmed.to_string();
                    Some(token.with_text(text))
                }
            })
            .collect();

        Ok(Box::new(filtered.into_iter()))
    }

    fn name(&self) -> &'static str {
        "trim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_filter() {
        let filter = TrimFilter::new();
        let tokens = vec![Token::new("  spaced  ", 0), Token::new("   ", 1)];

        let result: Vec<Token> = filter
            .filter(Box::new(tokens.into_iter()))
            .unwrap()
            .collect();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "spaced");
    }
}
