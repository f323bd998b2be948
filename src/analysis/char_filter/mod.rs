//! Char filter implementations that normalize raw text before tokenization.

/// Trait for filters that transform raw text before it reaches the tokenizer.
pub trait CharFilter: Send + Sync {
    /// Apply this filter to the text, returning the transformed text.
    fn filter(&self, text: &str) -> String;

    /// Get the name of this filter.
    fn name(&self) -> &'static str;
}

pub mod mapping;
pub mod pattern_replace;

pub use mapping::MappingCharFilter;
pub use pattern_replace::PatternReplaceCharFilter;
