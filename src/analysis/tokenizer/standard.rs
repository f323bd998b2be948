//! Standard tokenizer based on Unicode word boundaries (UAX #29).

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::Tokenizer;
use crate::error::Result;

/// A tokenizer that splits text on Unicode word boundaries, keeping only
/// segments that contain at least one alphanumeric character.
#[derive(Clone, Debug, Default)]
pub struct StandardTokenizer;

impl StandardTokenizer {
    /// Create a new standard tokenizer.
    pub fn new() -> Self {
        StandardTokenizer
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = text
            .unicode_word_indices()
            .enumerate()
            .map(|(position, (offset, word))| {
                Token::with_offsets(word, position, offset, offset + word.len())
            })
            .collect();

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// A tokenizer that splits on non-letter characters, producing letter-only
/// runs. Backs the `simple` analyzer.
#[derive(Clone, Debug, Default)]
pub struct LetterTokenizer;

impl LetterTokenizer {
    pub fn new() -> Self {
        LetterTokenizer
    }
}

impl Tokenizer for LetterTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut position = 0;
        let mut start: Option<usize> = None;

        for (idx, ch) in text.char_indices() {
            if ch.is_alphabetic() {
                if start.is_none() {
                    start = Some(idx);
                }
            } else if let Some(s) = start.take() {
                tokens.push(Token::with_offsets(&text[s..idx], position, s, idx));
                position += 1;
            }
        }
        if let Some(s) = start {
            tokens.push(Token::with_offsets(&text[s..], position, s, text.len()));
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "letter"
    }
}

/// A tokenizer that recognizes URLs and email addresses as single tokens,
/// splitting the remainder on word boundaries. Backs the `web` analyzer.
#[derive(Clone, Debug)]
pub struct WebTokenizer {
    pattern: regex::Regex,
}

impl WebTokenizer {
    pub fn new() -> Self {
        // Emails and schemes first so they win over the word fallback.
        let pattern = regex::Regex::new(
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}|https?://[^\s]+|\w+",
        )
        .expect("web tokenizer pattern is valid");
        WebTokenizer { pattern }
    }
}

impl Default for WebTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WebTokenizer {
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
        "web"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tokenizer() {
        let tokenizer = StandardTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("Hello, world! 你好").unwrap().collect();

        assert_eq!(tokens[0].text, "Hello");
        assert_eq!(tokens[1].text, "world");
    }

    #[test]
    fn test_standard_tokenizer_offsets() {
        let tokenizer = StandardTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("abc def").unwrap().collect();

        assert_eq!(tokens[1].start_offset, 4);
        assert_eq!(tokens[1].end_offset, 7);
    }

    #[test]
    fn test_letter_tokenizer_splits_digits() {
        let tokenizer = LetterTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("abc123def").unwrap().collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "abc");
        assert_eq!(tokens[1].text, "def");
    }

    #[test]
    fn test_web_tokenizer_keeps_email_whole() {
        let tokenizer = WebTokenizer::new();
        let tokens: Vec<Token> = tokenizer
            .tokenize("mail me at a.b@example.com today")
            .unwrap()
            .collect();

        assert!(tokens.iter().any(|t| t.text == "a.b@example.com"));
    }
}
