//! Capability traits for index backends.
//!
//! A host that stores objects talks to its index through these traits only,
//! so any backend can stand in for [`IndexEngine`]. They are object safe and
//! can be used as `Arc<dyn Ingestible>` and so on.

use std::fmt::Debug;
use std::sync::Arc;

use crate::engine::IndexEngine;
use crate::engine::report::IndexReport;
use crate::error::Result;
use crate::lexical::search::ResultStream;
use crate::source::IngestItem;

/// A backend that accepts objects for indexing.
pub trait Ingestible: Send + Sync + Debug {
    /// Whether this backend indexes the object at `uri`.
    fn handles(&self, uri: &str) -> bool;

    fn index(&self, item: &dyn IngestItem) -> IndexReport;

    fn index_batch(&self, items: &[Arc<dyn IngestItem>]) -> IndexReport;
}

/// A backend that answers query strings.
pub trait Queryable: Send + Sync + Debug {
    /// Stream the objects matching `query`, with the stored values of
    /// `fields` on each result.
    fn query(&self, query: &str, fields: &[&str]) -> Result<ResultStream>;
}

/// A backend that forgets objects.
pub trait Removable: Send + Sync + Debug {
    /// Remove the object at `uri`. Returns `false` when it could not be
    /// removed.
    fn unindex(&self, uri: &str) -> bool;
}

impl Ingestible for IndexEngine {
    fn handles(&self, uri: &str) -> bool {
        IndexEngine::handles(self, uri)
    }

    fn index(&self, item: &dyn IngestItem) -> IndexReport {
        self.index_one(item)
    }

    fn index_batch(&self, items: &[Arc<dyn IngestItem>]) -> IndexReport {
        IndexEngine::index_batch(self, items)
    }
}

impl Queryable for IndexEngine {
    fn query(&self, query: &str, fields: &[&str]) -> Result<ResultStream> {
        IndexEngine::query(self, query, fields)
    }
}

impl Removable for IndexEngine {
    fn unindex(&self, uri: &str) -> bool {
        IndexEngine::unindex(self, uri)
    }
}
