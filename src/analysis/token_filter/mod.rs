//! Token filter implementations for token transformation.

use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Trait for filters that transform token streams.
pub trait TokenFilter: Send + Sync {
    /// Apply this filter to a token stream.
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream>;

    /// Get the name of this filter.
    fn name(&self) -> &'static str;
}

pub mod case;
pub mod length;
pub mod stop;
pub mod trim;

pub use case::{LowercaseFilter, UppercaseFilter};
pub use length::LengthFilter;
pub use stop::StopFilter;
pub use trim::TrimFilter;
