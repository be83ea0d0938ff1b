//! Point-in-time index readers.

use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use log::debug;

use crate::error::{MedIndexError, Result};
use crate::lexical::index::codec::decode_segment;
use crate::lexical::index::commit::{CommitPoint, segment_file_name};
use crate::lexical::index::segment::Segment;
use crate::lexical::index::writer::deleted_set;
use crate::storage::{self, Storage};

/// Attempts made when a commit point disappears while it is being loaded.
const OPEN_ATTEMPTS: usize = 3;

/// A segment together with the deletions of one commit generation.
#[derive(Debug, Clone)]
pub struct SegmentReader {
    segment: Arc<Segment>,
    deleted: Arc<BitVec>,
}

impl SegmentReader {
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn is_deleted(&self, doc: u32) -> bool {
        self.deleted.get(doc as usize).unwrap_or(true)
    }

    pub fn deleted(&self) -> &BitVec {
        &self.deleted
    }

    /// Number of documents that are not deleted.
    pub fn num_docs(&self) -> usize {
        self.deleted.iter().filter(|d| !d).count()
    }
}

/// An immutable view of one committed generation.
///
/// A reader never changes. [`IndexReader::open_if_changed`] produces a new
/// reader for a newer generation, sharing the segments both have in common.
#[derive(Debug, Clone)]
pub struct IndexReader {
    storage: Arc<dyn Storage>,
    generation: u64,
    segments: Vec<SegmentReader>,
}

impl IndexReader {
    /// Open the latest committed generation. An index that was never committed
    /// opens as an empty generation 0.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::load(storage, &AHashMap::new())
    }

    /// A reader for the latest generation, or `None` if it is still this one.
    pub fn open_if_changed(&self) -> Result<Option<Self>> {
        let latest = CommitPoint::latest_generation(self.storage.as_ref())?.unwrap_or(0);
        if latest == self.generation {
            return Ok(None);
        }

        let cache: AHashMap<String, Arc<Segment>> = self
            .segments
            .iter()
            .map(|s| (s.segment.name().to_string(), Arc::clone(&s.segment)))
            .collect();
        let reader = Self::load(Arc::clone(&self.storage), &cache)?;
        debug!(
            "reader reopened from generation {} to {}",
            self.generation, reader.generation
        );
        Ok(Some(reader))
    }

    fn load(storage: Arc<dyn Storage>, cache: &AHashMap<String, Arc<Segment>>) -> Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::try_load(&storage, cache) {
                Err(MedIndexError::Storage(msg)) if attempt < OPEN_ATTEMPTS => {
                    debug!("commit point changed while opening reader ({msg}), retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn try_load(
        storage: &Arc<dyn Storage>,
        cache: &AHashMap<String, Arc<Segment>>,
    ) -> Result<Self> {
        let Some(commit) = CommitPoint::load_latest(storage.as_ref())? else {
            return Ok(IndexReader {
                storage: Arc::clone(storage),
                generation: 0,
                segments: Vec::new(),
            });
        };

        let mut segments = Vec::with_capacity(commit.segments.len());
        for info in &commit.segments {
            let segment = match cache.get(&info.name) {
                Some(segment) => Arc::clone(segment),
                None => {
                    let bytes =
                        storage::read_all(storage.as_ref(), &segment_file_name(&info.name))?;
                    Arc::new(decode_segment(&info.name, &bytes)?)
                }
            };
            let deleted = deleted_set(info, segment.doc_count())?;
            segments.push(SegmentReader {
                segment,
                deleted: Arc::new(deleted),
            });
        }

        Ok(IndexReader {
            storage: Arc::clone(storage),
            generation: commit.generation,
            segments,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> usize {
        self.segments.iter().map(SegmentReader::num_docs).sum()
    }

    /// Number of documents, deleted ones included.
    pub fn max_doc(&self) -> usize {
        self.segments.iter().map(|s| s.segment.doc_count()).sum()
    }
}
