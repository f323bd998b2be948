//! Mapping char filter: literal string replacements.

use crate::analysis::char_filter::CharFilter;
use crate::error::{GalenaError, Result};

/// A char filter that replaces literal substrings according to a list of
/// `"from => to"` rules. Rules apply in declaration order.
#[derive(Clone, Debug)]
pub struct MappingCharFilter {
    rules: Vec<(String, String)>,
}

impl MappingCharFilter {
    /// Build from `"a => b"` rule strings.
    pub fn from_rules<I, S>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for rule in rules {
            let rule = rule.as_ref();
            let (from, to) = rule.split_once("=>").ok_or_else(|| {
                GalenaError::parsing(format!(
                    "[char_filter] mapping rule [{rule}] is missing '=>'"
                ))
            })?;
            let from = from.trim().to_string();
            if from.is_empty() {
                return Err(GalenaError::parsing(format!(
                    "[char_filter] mapping rule [{rule}] has an empty source"
                )));
            }
            parsed.push((from, to.trim().to_string()));
        }
        Ok(MappingCharFilter { rules: parsed })
    }
}

impl CharFilter for MappingCharFilter {
    fn filter(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (from, to) in &self.rules {
            out = out.replace(from.as_str(), to);
        }
        out
    }

    fn name(&self) -> &'static str {
        "mapping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_rules_apply_in_order() {
        let filter = MappingCharFilter::from_rules(["& => and", ":) => happy"]).unwrap();
        assert_eq!(filter.filter("cats & dogs :)"), "cats and dogs happy");
    }

    #[test]
    fn test_malformed_rule_rejected() {
        assert!(MappingCharFilter::from_rules(["no-arrow"]).is_err());
        assert!(MappingCharFilter::from_rules([" => b"]).is_err());
    }
}
