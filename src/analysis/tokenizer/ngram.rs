//! N-gram tokenizer implementations.

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::Tokenizer;
use crate::error::{GalenaError, Result};

fn validate_gram_sizes(min_gram: usize, max_gram: usize) -> Result<()> {
    if min_gram == 0 || min_gram > max_gram {
        return Err(GalenaError::parsing(format!(
            "[tokenizer] ngram requires 0 < min_gram <= max_gram, got [{min_gram}, {max_gram}]"
        )));
    }
    Ok(())
}

/// A tokenizer that emits all character n-grams of the input within a size
/// window. Whitespace is skipped.
#[derive(Clone, Debug)]
pub struct NgramTokenizer {
    min_gram: usize,
    max_gram: usize,
}

impl NgramTokenizer {
    /// Create a new n-gram tokenizer. Defaults are min 1, max 2.
    pub fn new(min_gram: usize, max_gram: usize) -> Result<Self> {
        validate_gram_sizes(min_gram, max_gram)?;
        Ok(NgramTokenizer { min_gram, max_gram })
    }
}

impl Tokenizer for NgramTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let chars: Vec<(usize, char)> = text
            .char_indices()
            .filter(|(_, c)| !c.is_whitespace())
            .collect();
        let mut tokens = Vec::new();
        let mut position = 0;

        for start in 0..chars.len() {
            for len in self.min_gram..=self.max_gram {
                if start + len > chars.len() {
                    break;
                }
                let start_offset = chars[start].0;
                let (last_idx, last_char) = chars[start + len - 1];
                let end_offset = last_idx + last_char.len_utf8();
                let gram: String = chars[start..start + len].iter().map(|(_, c)| c).collect();
                tokens.push(Token::with_offsets(gram, position, start_offset, end_offset));
                position += 1;
            }
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "ngram"
    }
}

/// A tokenizer that emits n-grams anchored at the start of each word.
#[derive(Clone, Debug)]
pub struct EdgeNgramTokenizer {
    min_gram: usize,
    max_gram: usize,
}

impl EdgeNgramTokenizer {
    pub fn new(min_gram: usize, max_gram: usize) -> Result<Self> {
        validate_gram_sizes(min_gram, max_gram)?;
        Ok(EdgeNgramTokenizer { min_gram, max_gram })
    }
}

impl Tokenizer for EdgeNgramTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut position = 0;

        for (word_start, word) in split_words(text) {
            let chars: Vec<char> = word.chars().collect();
            for len in self.min_gram..=self.max_gram.min(chars.len()) {
                let gram: String = chars[..len].iter().collect();
                let end_offset = word_start + gram.len();
                tokens.push(Token::with_offsets(gram, position, word_start, end_offset));
                position += 1;
            }
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "edge_ngram"
    }
}

fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                words.push((s, &text[s..idx]));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngram_window() {
        let tokenizer = NgramTokenizer::new(2, 3).unwrap();
        let texts: Vec<String> = tokenizer
            .tokenize("abc")
            .unwrap()
            .map(|t| t.text)
            .collect();

        assert_eq!(texts, vec!["ab", "abc", "bc"]);
    }

    #[test]
    fn test_edge_ngram_per_word() {
        let tokenizer = EdgeNgramTokenizer::new(1, 2).unwrap();
        let texts: Vec<String> = tokenizer
            .tokenize("go fn")
            .unwrap()
            .map(|t| t.text)
            .collect();

        assert_eq!(texts, vec!["g", "go", "f", "fn"]);
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert!(NgramTokenizer::new(3, 2).is_err());
        assert!(EdgeNgramTokenizer::new(0, 2).is_err());
    }
}
