//! Phrase query.

use std::any::Any;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::{Posting, Segment};
use crate::lexical::query::Query;

/// Matches documents where the terms occur at consecutive positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseQuery {
    field: String,
    terms: Vec<String>,
}

impl PhraseQuery {
    pub fn new<F: Into<String>>(field: F, terms: Vec<String>) -> Self {
        PhraseQuery {
            field: field.into(),
            terms,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

fn find_posting(postings: &[Posting], doc: u32) -> Option<&Posting> {
    postings
        .binary_search_by_key(&doc, |p| p.doc)
        .ok()
        .map(|i| &postings[i])
}

impl Query for PhraseQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        if self.terms.is_empty() {
            return Ok(set);
        }

        let mut lists = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match segment.postings(&self.field, term) {
                Some(postings) => lists.push(postings.as_slice()),
                None => return Ok(set),
            }
        }

        let (first, rest) = lists.split_at(1);
        'docs: for lead in first[0] {
            let mut others = Vec::with_capacity(rest.len());
            for list in rest {
                match find_posting(list, lead.doc) {
                    Some(posting) => others.push(posting),
                    None => continue 'docs,
                }
            }

            let found = lead.positions.iter().any(|start| {
                others.iter().enumerate().all(|(offset, posting)| {
                    posting
                        .positions
                        .binary_search(&(start + offset as u32 + 1))
                        .is_ok()
                })
            });
            if found {
                set.set(lead.doc as usize, true);
            }
        }

        Ok(set)
    }

    fn description(&self) -> String {
        format!("{}:\"{}\"", self.field, self.terms.join(" "))
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
