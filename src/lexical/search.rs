//! Lazy result streaming.

use std::collections::BTreeMap;

use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lexical::core::StoredValue;
use crate::lexical::index::{IndexReader, SegmentReader};
use crate::lexical::query::Query;

/// One matching document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identity of the indexed object.
    pub uri: String,
    /// Requested stored fields. Fields the document lacks are absent.
    pub fields: BTreeMap<String, StoredValue>,
}

impl SearchResult {
    pub fn get(&self, field: &str) -> Option<&StoredValue> {
        self.fields.get(field)
    }
}

struct SegmentCursor {
    reader: SegmentReader,
    hits: BitVec,
    next: usize,
}

/// Forward-only, single-pass stream of search results.
///
/// Segments are evaluated one at a time as the stream advances, so only the
/// match set of the current segment is ever held. The stream reads the
/// generation that was current when it was created; later commits are not
/// observed.
pub struct ResultStream {
    query: Box<dyn Query>,
    pending: std::vec::IntoIter<SegmentReader>,
    current: Option<SegmentCursor>,
    identity_field: String,
    fields: Vec<String>,
    generation: u64,
    failed: bool,
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("query", &self.query.description())
            .field("generation", &self.generation)
            .field("remaining_segments", &self.pending.len())
            .field("fields", &self.fields)
            .finish()
    }
}

impl ResultStream {
    pub fn new<S: Into<String>>(
        reader: &IndexReader,
        query: Box<dyn Query>,
        identity_field: S,
        fields: Vec<String>,
    ) -> Self {
        ResultStream {
            query,
            pending: reader.segments().to_vec().into_iter(),
            current: None,
            identity_field: identity_field.into(),
            fields,
            generation: reader.generation(),
            failed: false,
        }
    }

    /// Generation of the snapshot this stream reads.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn result_for(&self, reader: &SegmentReader, doc: u32) -> SearchResult {
        let segment = reader.segment();
        let uri = segment
            .stored_value(doc, &self.identity_field)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let fields = self
            .fields
            .iter()
            .filter_map(|name| {
                segment
                    .stored_value(doc, name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        SearchResult { uri, fields }
    }
}

impl Iterator for ResultStream {
    type Item = Result<SearchResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }

            if let Some(cursor) = self.current.as_mut() {
                while cursor.next < cursor.hits.len() {
                    let doc = cursor.next as u32;
                    cursor.next += 1;
                    if cursor.hits.get(doc as usize).unwrap_or(false)
                        && !cursor.reader.is_deleted(doc)
                    {
                        let reader = cursor.reader.clone();
                        return Some(Ok(self.result_for(&reader, doc)));
                    }
                }
                self.current = None;
            }

            let reader = self.pending.next()?;
            match self.query.matches(reader.segment()) {
                Ok(hits) => {
                    self.current = Some(SegmentCursor {
                        reader,
                        hits,
                        next: 0,
                    })
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
