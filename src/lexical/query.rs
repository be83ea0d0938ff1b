//! Queries over the inverted index.
//!
//! Every query evaluates one segment at a time into a [`BitVec`] holding one bit
//! per document ordinal. Deletions are not applied here; the searcher masks
//! them out afterwards.

pub mod boolean;
pub mod match_all;
pub mod parser;
pub mod phrase;
pub mod range;
pub mod regexp;
pub mod term;
pub mod wildcard;

use std::any::Any;
use std::fmt::Debug;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::{PostingList, Segment};

pub use boolean::{BooleanClause, BooleanQuery, Occur};
pub use match_all::MatchAllQuery;
pub use parser::{DefaultRangeQueryBuilder, QueryParser, RangeQueryBuilder};
pub use phrase::PhraseQuery;
pub use range::{PointRangeQuery, TermRangeQuery};
pub use regexp::RegexpQuery;
pub use term::TermQuery;
pub use wildcard::WildcardQuery;

/// A compiled query.
pub trait Query: Send + Sync + Debug {
    /// Documents of `segment` that match, ignoring deletions.
    ///
    /// The returned set always has exactly `segment.doc_count()` bits.
    fn matches(&self, segment: &Segment) -> Result<BitVec>;

    /// Human readable form, close to the query syntax.
    fn description(&self) -> String;

    fn clone_box(&self) -> Box<dyn Query>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Query> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Set the bit of every document in a posting list.
pub(crate) fn mark_postings(set: &mut BitVec, postings: &PostingList) {
    for posting in postings {
        set.set(posting.doc as usize, true);
    }
}
