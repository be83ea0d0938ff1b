//! Wildcard query implementation for pattern matching.

use std::any::Any;
use std::ops::Bound;
use std::sync::Arc;

use bit_vec::BitVec;
use regex::Regex;

use crate::error::{MedIndexError, Result};
use crate::lexical::index::segment::Segment;
use crate::lexical::query::{Query, mark_postings};

/// A query that matches documents containing terms that match a wildcard pattern.
///
/// Supports the following wildcards:
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
/// - `\*` and `\?` match literal `*` and `?` characters
///
/// Leading wildcards are allowed; they force a scan of the whole term
/// dictionary of the field.
#[derive(Debug, Clone)]
pub struct WildcardQuery {
    field: String,
    pattern: String,
    /// Literal text before the first wildcard, used to narrow the scan.
    prefix: String,
    regex: Arc<Regex>,
}

impl WildcardQuery {
    pub fn new<F: Into<String>, P: Into<String>>(field: F, pattern: P) -> Result<Self> {
        let field = field.into();
        let pattern = pattern.into();
        let (regex_pattern, prefix) = Self::compile_pattern(&pattern);
        let regex = Regex::new(&regex_pattern)
            .map_err(|e| MedIndexError::parse(format!("invalid wildcard pattern {pattern}: {e}")))?;

        Ok(WildcardQuery {
            field,
            pattern,
            prefix,
            regex: Arc::new(regex),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Translate the pattern into an anchored regex and its literal prefix.
    fn compile_pattern(pattern: &str) -> (String, String) {
        let mut regex_pattern = String::from("^");
        let mut prefix = String::new();
        let mut in_prefix = true;
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let literal = chars.next().unwrap_or('\\');
                    regex_pattern.push_str(&regex::escape(&literal.to_string()));
                    if in_prefix {
                        prefix.push(literal);
                    }
                }
                '*' => {
                    regex_pattern.push_str(".*");
                    in_prefix = false;
                }
                '?' => {
                    regex_pattern.push('.');
                    in_prefix = false;
                }
                c => {
                    regex_pattern.push_str(&regex::escape(&c.to_string()));
                    if in_prefix {
                        prefix.push(c);
                    }
                }
            }
        }

        regex_pattern.push('$');
        (regex_pattern, prefix)
    }

    /// Whether a single term matches the pattern.
    pub fn matches_term(&self, term: &str) -> bool {
        self.regex.is_match(term)
    }
}

impl Query for WildcardQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        let Some(dictionary) = segment.terms(&self.field) else {
            return Ok(set);
        };

        let range = dictionary.range::<str, _>((Bound::Included(self.prefix.as_str()), Bound::Unbounded));
        for (term, postings) in range {
            if !term.starts_with(&self.prefix) {
                break;
            }
            if self.regex.is_match(term) {
                mark_postings(&mut set, postings);
            }
        }
        Ok(set)
    }

    fn description(&self) -> String {
        format!("{}:{}", self.field, self.pattern)
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PerFieldAnalyzer;
    use crate::lexical::core::Document;

    fn segment() -> Segment {
        let analyzer = PerFieldAnalyzer::default();
        let docs: Vec<_> = ["salvador", "salvatore", "dali", "sal"]
            .iter()
            .map(|t| Document::new().with_field("PatientName", *t).materialize(&analyzer))
            .collect();
        Segment::from_documents("s", &docs)
    }

    #[test]
    fn test_wildcard_pattern_compilation() {
        let query = WildcardQuery::new("f", "sal*").unwrap();
        assert_eq!(query.prefix, "sal");
        assert!(query.matches_term("salvador"));
        assert!(query.matches_term("sal"));
        assert!(!query.matches_term("dali"));

        let query = WildcardQuery::new("f", "d?li").unwrap();
        assert!(query.matches_term("dali"));
        assert!(!query.matches_term("dalli"));
    }

    #[test]
    fn test_escaped_wildcards() {
        let query = WildcardQuery::new("f", r"a\*b*").unwrap();
        assert!(query.matches_term("a*bc"));
        assert!(!query.matches_term("axbc"));
    }

    #[test]
    fn test_special_regex_characters() {
        let query = WildcardQuery::new("f", "1.2.*").unwrap();
        assert!(query.matches_term("1.2.840"));
        assert!(!query.matches_term("1x2.840"));
    }

    #[test]
    fn test_matches_segment() {
        let segment = segment();
        let set = WildcardQuery::new("PatientName", "salva*")
            .unwrap()
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![true, true, false, false]);

        let set = WildcardQuery::new("PatientName", "*li")
            .unwrap()
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![false, false, true, false]);
    }
}
