//! Index writer.
//!
//! Documents are buffered in RAM and frozen into a segment when the buffer
//! grows past its bounds. Nothing is visible to readers until [`IndexWriter::commit`]
//! persists new segments and writes the next commit point.

use std::sync::Arc;

use ahash::AHashSet;
use bit_vec::BitVec;
use chrono::Utc;
use log::{debug, warn};

use crate::analysis::PerFieldAnalyzer;
use crate::error::{MedIndexError, Result};
use crate::lexical::core::{AnalyzedDocument, Document, StoredValue};
use crate::lexical::index::codec::{decode_segment, encode_segment};
use crate::lexical::index::commit::{
    CommitPoint, SegmentInfo, parse_segment_file_name, segment_file_name,
};
use crate::lexical::index::segment::Segment;
use crate::lexical::query::Query;
use crate::storage::{self, Storage};

/// Number of commit generations kept in storage, the current one included.
const KEPT_COMMITS: usize = 2;

/// Index writer configuration.
#[derive(Debug, Clone)]
pub struct IndexWriterConfig {
    /// RAM buffer bound in megabytes before buffered documents are frozen
    /// into a segment.
    pub ram_buffer_size_mb: f64,

    /// Maximum number of buffered documents before a segment is frozen.
    pub max_buffered_docs: usize,

    /// Segment count above which segments are merged at commit.
    pub max_segments: usize,

    /// Number of segments merged together at a time.
    pub merge_factor: usize,

    /// Analyzer used by [`IndexWriter::add_document`].
    pub analyzer: Arc<PerFieldAnalyzer>,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            ram_buffer_size_mb: 255.0,
            max_buffered_docs: 10_000,
            max_segments: 10,
            merge_factor: 10,
            analyzer: Arc::new(PerFieldAnalyzer::default()),
        }
    }
}

/// Statistics about the writing process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Number of documents added.
    pub docs_added: u64,
    /// Number of documents deleted, buffered ones included.
    pub docs_deleted: u64,
    /// Number of segments frozen from the RAM buffer.
    pub segments_flushed: u64,
    /// Number of segments consumed by merges.
    pub segments_merged: u64,
    /// Number of commit points written.
    pub commits: u64,
}

#[derive(Debug)]
struct LiveSegment {
    segment: Arc<Segment>,
    deleted: BitVec,
    persisted: bool,
}

impl LiveSegment {
    fn live_docs(&self) -> usize {
        self.deleted.iter().filter(|d| !d).count()
    }

    fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: self.segment.name().to_string(),
            doc_count: self.segment.doc_count() as u32,
            deleted: self
                .deleted
                .iter()
                .enumerate()
                .filter(|(_, d)| *d)
                .map(|(doc, _)| doc as u32)
                .collect(),
        }
    }
}

/// Single writer over an index in a [`Storage`].
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,
    segments: Vec<LiveSegment>,
    buffer: Vec<AnalyzedDocument>,
    buffer_bytes: usize,
    generation: u64,
    next_segment_id: u64,
    dirty: bool,
    closed: bool,
    stats: WriterStats,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("segments", &self.segments.len())
            .field("buffered_docs", &self.buffer.len())
            .field("closed", &self.closed)
            .field("stats", &self.stats)
            .finish()
    }
}

impl IndexWriter {
    /// Open a writer on the latest commit point of `storage`.
    pub fn open(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Result<Self> {
        let mut segments = Vec::new();
        let mut generation = 0;
        let mut next_segment_id = 0;

        if let Some(commit) = CommitPoint::load_latest(storage.as_ref())? {
            generation = commit.generation;
            next_segment_id = commit.next_segment_id;
            for info in &commit.segments {
                let bytes = storage::read_all(storage.as_ref(), &segment_file_name(&info.name))?;
                let segment = decode_segment(&info.name, &bytes)?;
                let deleted = deleted_set(info, segment.doc_count())?;
                segments.push(LiveSegment {
                    segment: Arc::new(segment),
                    deleted,
                    persisted: true,
                });
            }
        }

        let writer = IndexWriter {
            storage,
            config,
            segments,
            buffer: Vec::new(),
            buffer_bytes: 0,
            generation,
            next_segment_id,
            dirty: false,
            closed: false,
            stats: WriterStats::default(),
        };
        writer.cleanup();
        debug!(
            "opened index writer at generation {} with {} segments",
            writer.generation,
            writer.segments.len()
        );
        Ok(writer)
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            return Err(MedIndexError::index("index writer is closed"));
        }
        Ok(())
    }

    /// Analyze and buffer a document.
    pub fn add_document(&mut self, doc: &Document) -> Result<()> {
        let analyzed = doc.materialize(&self.config.analyzer);
        self.add_analyzed_document(analyzed)
    }

    /// Buffer an already analyzed document.
    pub fn add_analyzed_document(&mut self, doc: AnalyzedDocument) -> Result<()> {
        self.check_closed()?;

        self.buffer_bytes += doc.estimated_size();
        self.buffer.push(doc);
        self.dirty = true;
        self.stats.docs_added += 1;

        if self.should_flush() {
            self.flush_buffer();
        }
        Ok(())
    }

    fn should_flush(&self) -> bool {
        let limit = (self.config.ram_buffer_size_mb * 1024.0 * 1024.0) as usize;
        self.buffer.len() >= self.config.max_buffered_docs.max(1) || self.buffer_bytes >= limit
    }

    fn next_segment_name(&mut self) -> String {
        let name = format!("seg_{:08}", self.next_segment_id);
        self.next_segment_id += 1;
        name
    }

    /// Freeze buffered documents into an unpersisted segment.
    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let name = self.next_segment_name();
        let segment = Segment::from_documents(name, &self.buffer);
        debug!(
            "flushed {} buffered documents ({} bytes) into {}",
            self.buffer.len(),
            self.buffer_bytes,
            segment.name()
        );
        self.segments.push(LiveSegment {
            deleted: segment.empty_doc_set(),
            segment: Arc::new(segment),
            persisted: false,
        });
        self.buffer.clear();
        self.buffer_bytes = 0;
        self.stats.segments_flushed += 1;
    }

    /// Delete every document matching `query`.
    ///
    /// Buffered documents are dropped at once. Deletions in committed segments
    /// become visible to readers at the next commit. Returns the number of
    /// documents deleted.
    pub fn delete_documents(&mut self, query: &dyn Query) -> Result<u64> {
        self.check_closed()?;
        let mut deleted = 0u64;

        if !self.buffer.is_empty() {
            let pending = Segment::from_documents("buffer", &self.buffer);
            let hits = query.matches(&pending)?;
            let mut ordinal = 0;
            let before = self.buffer.len();
            self.buffer.retain(|_| {
                let keep = !hits.get(ordinal).unwrap_or(false);
                ordinal += 1;
                keep
            });
            deleted += (before - self.buffer.len()) as u64;
            self.buffer_bytes = self.buffer.iter().map(|d| d.estimated_size()).sum();
        }

        for live in &mut self.segments {
            let hits = query.matches(&live.segment)?;
            for (doc, hit) in hits.iter().enumerate() {
                if hit && !live.deleted.get(doc).unwrap_or(true) {
                    live.deleted.set(doc, true);
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            self.dirty = true;
            self.stats.docs_deleted += deleted;
        }
        debug!("deleted {deleted} documents matching {}", query.description());
        Ok(deleted)
    }

    /// Stored values of `field` in the live documents matching `query`,
    /// uncommitted ones included.
    pub fn matching_stored_values(
        &self,
        query: &dyn Query,
        field: &str,
    ) -> Result<Vec<StoredValue>> {
        self.check_closed()?;
        let mut values = Vec::new();

        if !self.buffer.is_empty() {
            let pending = Segment::from_documents("buffer", &self.buffer);
            let hits = query.matches(&pending)?;
            for (doc, hit) in hits.iter().enumerate() {
                if !hit {
                    continue;
                }
                if let Some(value) = self.buffer.get(doc).and_then(|d| d.stored_value(field)) {
                    values.push(value.clone());
                }
            }
        }

        for live in &self.segments {
            let hits = query.matches(&live.segment)?;
            for (doc, hit) in hits.iter().enumerate() {
                if !hit || live.deleted.get(doc).unwrap_or(true) {
                    continue;
                }
                if let Some(value) = live.segment.stored_value(doc as u32, field) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    /// Whether an uncommitted document has `term` in `field`.
    ///
    /// Covers documents added since the last commit that readers cannot see yet.
    pub fn pending_match(&self, field: &str, term: &str) -> bool {
        if self.buffer.iter().any(|doc| doc.has_term(field, term)) {
            return true;
        }
        self.segments.iter().filter(|s| !s.persisted).any(|live| {
            live.segment.postings(field, term).is_some_and(|postings| {
                postings
                    .iter()
                    .any(|p| !live.deleted.get(p.doc as usize).unwrap_or(true))
            })
        })
    }

    /// Persist all changes and publish a new commit point.
    ///
    /// Returns the generation readers will observe. A commit without changes
    /// writes nothing and returns the current generation.
    pub fn commit(&mut self) -> Result<u64> {
        self.check_closed()?;
        self.flush_buffer();
        if !self.dirty {
            return Ok(self.generation);
        }

        self.segments.retain(|s| s.live_docs() > 0);
        self.maybe_merge();

        for live in &mut self.segments {
            if live.persisted {
                continue;
            }
            let bytes = encode_segment(&live.segment)?;
            storage::write_atomic(
                self.storage.as_ref(),
                &segment_file_name(live.segment.name()),
                &bytes,
            )?;
            live.persisted = true;
        }

        let commit = CommitPoint {
            generation: self.generation + 1,
            segments: self.segments.iter().map(LiveSegment::info).collect(),
            next_segment_id: self.next_segment_id,
            timestamp: Utc::now(),
        };
        commit.write(self.storage.as_ref())?;

        self.generation = commit.generation;
        self.dirty = false;
        self.stats.commits += 1;
        debug!(
            "committed generation {} with {} segments and {} live documents",
            commit.generation,
            commit.segments.len(),
            commit.num_docs()
        );

        self.cleanup();
        Ok(self.generation)
    }

    /// Merge the smallest segments while there are too many.
    fn maybe_merge(&mut self) {
        let factor = self.config.merge_factor.max(2);
        while self.segments.len() > self.config.max_segments.max(1) {
            let mut order: Vec<usize> = (0..self.segments.len()).collect();
            order.sort_by_key(|&i| self.segments[i].live_docs());
            let mut picked: Vec<usize> = order.into_iter().take(factor).collect();
            picked.sort_unstable();

            let name = self.next_segment_name();
            let sources: Vec<(&Segment, &BitVec)> = picked
                .iter()
                .map(|&i| (self.segments[i].segment.as_ref(), &self.segments[i].deleted))
                .collect();
            let merged = Segment::merge(name, &sources);
            debug!(
                "merged {} segments into {} ({} documents)",
                picked.len(),
                merged.name(),
                merged.doc_count()
            );

            for &i in picked.iter().rev() {
                self.segments.remove(i);
            }
            self.stats.segments_merged += picked.len() as u64;
            self.segments.push(LiveSegment {
                deleted: merged.empty_doc_set(),
                segment: Arc::new(merged),
                persisted: false,
            });
        }
    }

    /// Remove commit points older than the kept ones, and files none of the
    /// kept commit points reference. Failures are only logged.
    fn cleanup(&self) {
        if let Err(e) = self.try_cleanup() {
            warn!("index file cleanup failed: {e}");
        }
    }

    fn try_cleanup(&self) -> Result<()> {
        let generations = CommitPoint::generations(self.storage.as_ref())?;
        let keep_from = generations.len().saturating_sub(KEPT_COMMITS);
        let (old, kept) = generations.split_at(keep_from);

        let mut referenced: AHashSet<String> = AHashSet::new();
        for generation in kept {
            let commit = CommitPoint::load(self.storage.as_ref(), *generation)?;
            referenced.extend(commit.segments.into_iter().map(|s| s.name));
        }
        referenced.extend(
            self.segments
                .iter()
                .map(|s| s.segment.name().to_string()),
        );

        for generation in old {
            self.storage
                .delete_file(&CommitPoint::file_name(*generation))?;
        }
        for file in self.storage.list_files()? {
            let orphan = match parse_segment_file_name(&file) {
                Some(segment) => !referenced.contains(segment),
                None => file.ends_with(".tmp"),
            };
            if orphan {
                debug!("removing unreferenced index file {file}");
                self.storage.delete_file(&file)?;
            }
        }
        Ok(())
    }

    /// Commit pending changes and release the writer.
    ///
    /// The writer is closed even when the final commit fails.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.commit();
        self.closed = true;
        self.buffer.clear();
        self.buffer_bytes = 0;
        result.map(|_| ())
    }

    /// Release the writer without committing.
    ///
    /// Uncommitted documents and deletions are lost. Segment files written
    /// since the last commit point stay unreferenced and are removed by the
    /// cleanup of the next writer.
    pub fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffer.clear();
        self.buffer_bytes = 0;
        self.segments.clear();
        debug!("index writer aborted at generation {}", self.generation);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Generation of the last commit point written or opened.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_buffered_docs(&self) -> usize {
        self.buffer.len()
    }

    /// Live documents, uncommitted ones included.
    pub fn num_docs(&self) -> usize {
        self.buffer.len() + self.segments.iter().map(LiveSegment::live_docs).sum::<usize>()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }
}

/// Rebuild the deleted-document set recorded in a commit point.
pub(crate) fn deleted_set(info: &SegmentInfo, doc_count: usize) -> Result<BitVec> {
    if info.doc_count as usize != doc_count {
        return Err(MedIndexError::index(format!(
            "segment {} holds {doc_count} documents, commit point says {}",
            info.name, info.doc_count
        )));
    }
    let mut deleted = BitVec::from_elem(doc_count, false);
    for &doc in &info.deleted {
        if doc as usize >= doc_count {
            return Err(MedIndexError::index(format!(
                "segment {} deletes document {doc} beyond {doc_count}",
                info.name
            )));
        }
        deleted.set(doc as usize, true);
    }
    Ok(deleted)
}
