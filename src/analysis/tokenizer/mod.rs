//! Tokenizer implementations.

use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Trait for tokenizers that convert text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text into a stream of tokens.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this tokenizer.
    fn name(&self) -> &'static str;
}

pub mod keyword;
pub mod ngram;
pub mod regexp;
pub mod standard;
pub mod whitespace;

pub use keyword::KeywordTokenizer;
pub use ngram::{EdgeNgramTokenizer, NgramTokenizer};
pub use regexp::RegexpTokenizer;
pub use standard::{LetterTokenizer, StandardTokenizer, WebTokenizer};
pub use whitespace::WhitespaceTokenizer;
