//! Token types flowing through the analysis pipeline.

use serde::{Deserialize, Serialize};

/// A single unit of text produced by tokenization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The text content of the token.
    pub text: String,

    /// Position of the token in the token stream (0-based).
    pub position: usize,

    /// Byte offset where this token starts in the analyzed text.
    pub start_offset: usize,

    /// Byte offset where this token ends in the analyzed text.
    pub end_offset: usize,

    /// Whether a filter has marked this token as removed.
    pub stopped: bool,
}

/// A stream of tokens produced by a tokenizer or filter.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;

impl Token {
    /// Create a new token with the given text and position.
    pub fn new<S: Into<String>>(text: S, position: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
            stopped: false,
        }
    }

    /// Create a new token with text, position, and byte offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
            stopped: false,
        }
    }

    /// Replace the token text, keeping position and offsets.
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }

    /// Mark this token as stopped.
    pub fn stop(mut self) -> Self {
        self.stopped = true;
        self
    }

    /// Check if this token is stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let token = Token::with_offsets("hello", 0, 0, 5);
        assert_eq!(token.text, "hello");
        assert_eq!(token.end_offset, 5);
        assert!(!token.is_stopped());
    }

    #[test]
    fn test_token_stop() {
        let token = Token::new("the", 1).stop();
        assert!(token.is_stopped());
    }
}
