//! Query matching every document.

use std::any::Any;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::Segment;
use crate::lexical::query::Query;

/// Matches all documents (`*:*`).
#[derive(Debug, Clone, Default)]
pub struct MatchAllQuery;

impl MatchAllQuery {
    pub fn new() -> Self {
        MatchAllQuery
    }
}

impl Query for MatchAllQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        Ok(segment.full_doc_set())
    }

    fn description(&self) -> String {
        "*:*".to_string()
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
