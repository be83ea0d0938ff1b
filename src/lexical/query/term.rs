//! Exact term query.

use std::any::Any;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::Segment;
use crate::lexical::query::{Query, mark_postings};

/// Matches documents whose `field` contains exactly `term`.
///
/// The term is compared as is; analysis happens in the query parser.
#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    field: String,
    term: String,
}

impl TermQuery {
    pub fn new<F: Into<String>, T: Into<String>>(field: F, term: T) -> Self {
        TermQuery {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

impl Query for TermQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        if let Some(postings) = segment.postings(&self.field, &self.term) {
            mark_postings(&mut set, postings);
        }
        Ok(set)
    }

    fn description(&self) -> String {
        format!("{}:{}", self.field, self.term)
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
