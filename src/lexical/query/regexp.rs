//! Regular expression query.

use std::any::Any;
use std::sync::Arc;

use bit_vec::BitVec;
use regex::Regex;

use crate::error::{MedIndexError, Result};
use crate::lexical::index::segment::Segment;
use crate::lexical::query::{Query, mark_postings};

/// Matches documents with a term of `field` fully matching a regular expression.
#[derive(Debug, Clone)]
pub struct RegexpQuery {
    field: String,
    pattern: String,
    regex: Arc<Regex>,
}

impl RegexpQuery {
    pub fn new<F: Into<String>, P: Into<String>>(field: F, pattern: P) -> Result<Self> {
        let field = field.into();
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| MedIndexError::parse(format!("invalid regular expression /{pattern}/: {e}")))?;
        Ok(RegexpQuery {
            field,
            pattern,
            regex: Arc::new(regex),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Query for RegexpQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        if let Some(dictionary) = segment.terms(&self.field) {
            for (term, postings) in dictionary {
                if self.regex.is_match(term) {
                    mark_postings(&mut set, postings);
                }
            }
        }
        Ok(set)
    }

    fn description(&self) -> String {
        format!("{}:/{}/", self.field, self.pattern)
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
