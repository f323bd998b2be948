//! Pattern-replace char filter.

use std::sync::Arc;

use regex::Regex;

use crate::analysis::char_filter::CharFilter;
use crate::error::{GalenaError, Result};

/// A char filter that replaces every match of a regex with a replacement
/// string. The pattern is compiled once at construction time.
#[derive(Clone, Debug)]
pub struct PatternReplaceCharFilter {
    pattern: Arc<Regex>,
    replacement: String,
}

impl PatternReplaceCharFilter {
    /// Create a new pattern-replace filter.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            GalenaError::parsing(format!("[char_filter] pattern_replace is invalid: {e}"))
        })?;

        Ok(PatternReplaceCharFilter {
            pattern: Arc::new(regex),
            replacement: replacement.to_string(),
        })
    }
}

impl CharFilter for PatternReplaceCharFilter {
    fn filter(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }

    fn name(&self) -> &'static str {
        "pattern_replace"
    }
}
