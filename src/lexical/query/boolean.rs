//! Boolean query implementation for combining multiple queries.

use std::any::Any;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::Segment;
use crate::lexical::query::Query;

/// Occurrence requirements for boolean clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    /// The clause must match (equivalent to AND).
    Must,
    /// The clause should match (equivalent to OR).
    Should,
    /// The clause must not match (equivalent to NOT).
    MustNot,
}

/// A clause in a boolean query.
#[derive(Debug)]
pub struct BooleanClause {
    pub query: Box<dyn Query>,
    pub occur: Occur,
}

impl Clone for BooleanClause {
    fn clone(&self) -> Self {
        BooleanClause {
            query: self.query.clone_box(),
            occur: self.occur,
        }
    }
}

impl BooleanClause {
    pub fn new(query: Box<dyn Query>, occur: Occur) -> Self {
        BooleanClause { query, occur }
    }

    pub fn must(query: Box<dyn Query>) -> Self {
        BooleanClause::new(query, Occur::Must)
    }

    pub fn should(query: Box<dyn Query>) -> Self {
        BooleanClause::new(query, Occur::Should)
    }

    pub fn must_not(query: Box<dyn Query>) -> Self {
        BooleanClause::new(query, Occur::MustNot)
    }
}

/// A boolean query that combines multiple queries with boolean logic.
///
/// With at least one `Must` clause, `Should` clauses are optional and do not
/// restrict the result. Without `Must` clauses at least one `Should` clause has
/// to match. A query made only of `MustNot` clauses matches nothing; pair it
/// with a [`crate::lexical::query::MatchAllQuery`] to express pure negation.
#[derive(Debug, Clone, Default)]
pub struct BooleanQuery {
    clauses: Vec<BooleanClause>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
        }
    }

    pub fn add_clause(&mut self, clause: BooleanClause) {
        self.clauses.push(clause);
    }

    pub fn add_must(&mut self, query: Box<dyn Query>) {
        self.add_clause(BooleanClause::must(query));
    }

    pub fn add_should(&mut self, query: Box<dyn Query>) {
        self.add_clause(BooleanClause::should(query));
    }

    pub fn add_must_not(&mut self, query: Box<dyn Query>) {
        self.add_clause(BooleanClause::must_not(query));
    }

    pub fn clauses(&self) -> &[BooleanClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Clauses with the given occurrence.
    pub fn clauses_by_occur(&self, occur: Occur) -> impl Iterator<Item = &BooleanClause> {
        self.clauses.iter().filter(move |c| c.occur == occur)
    }
}

impl Query for BooleanQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut required: Option<BitVec> = None;
        for clause in self.clauses_by_occur(Occur::Must) {
            let set = clause.query.matches(segment)?;
            match required.as_mut() {
                Some(acc) => {
                    acc.and(&set);
                }
                None => required = Some(set),
            }
        }

        let mut result = match required {
            Some(set) => set,
            None => {
                let mut any = segment.empty_doc_set();
                for clause in self.clauses_by_occur(Occur::Should) {
                    any.or(&clause.query.matches(segment)?);
                }
                any
            }
        };

        if result.none() {
            return Ok(result);
        }
        for clause in self.clauses_by_occur(Occur::MustNot) {
            result.difference(&clause.query.matches(segment)?);
        }
        Ok(result)
    }

    fn description(&self) -> String {
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|c| {
                let prefix = match c.occur {
                    Occur::Must => "+",
                    Occur::Should => "",
                    Occur::MustNot => "-",
                };
                let inner = c.query.description();
                if c.query.as_any().is::<BooleanQuery>() {
                    format!("{prefix}({inner})")
                } else {
                    format!("{prefix}{inner}")
                }
            })
            .collect();
        parts.join(" ")
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
