//! The indexing engine.
//!
//! [`IndexEngine`] owns everything that is process-wide state in a running
//! index: the transaction-guarded writer, the set of instance identifiers
//! already submitted, the current reader and the tag dictionary. Callers share
//! one engine (typically behind an `Arc`) between ingestion tasks and queries.
//!
//! Indexing an item runs decoding and extraction without holding any lock;
//! only the final `add` goes through the shared writer. Queries read the
//! latest committed generation, reopening the reader when a commit happened
//! since the previous call.

pub mod config;
pub mod identity;
pub mod query;
pub mod report;
pub mod transaction;

use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::analysis::PerFieldAnalyzer;
use crate::dicom::{AttributeSet, DictionaryHandle, Extractor, TagDictionary, read_file_with};
use crate::error::{MedIndexError, Result};
use crate::lexical::core::Document;
use crate::lexical::index::IndexReader;
use crate::lexical::query::{Query, TermQuery};
use crate::lexical::search::{ResultStream, SearchResult};
use crate::source::{self, IngestItem};
use crate::storage::{Storage, StorageFactory};

use self::config::EngineConfig;
use self::identity::IndexedIdentitySet;
use self::query::DicomQueryParser;
use self::report::{IndexOutcome, IndexReport};
use self::transaction::{TransactionGuard, TransactionManager, TransactionStats};

/// Metadata index over DICOM objects.
pub struct IndexEngine {
    config: EngineConfig,
    storage: Arc<dyn Storage>,
    analyzer: Arc<PerFieldAnalyzer>,
    dictionary: Arc<DictionaryHandle>,
    transactions: TransactionManager,
    identities: IndexedIdentitySet,
    parser: DicomQueryParser,
    reader: RwLock<Arc<IndexReader>>,
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("config", &self.config)
            .field("transactions", &self.transactions)
            .field("identities", &self.identities.len())
            .field("generation", &self.reader.read().generation())
            .finish()
    }
}

impl IndexEngine {
    /// Open an engine on the storage named by `config`.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let storage = StorageFactory::create(config.storage.clone())?;
        Self::with_storage(storage, config)
    }

    /// Open an engine on an existing storage; `config.storage` is ignored.
    pub fn with_storage(storage: Arc<dyn Storage>, config: EngineConfig) -> Result<Self> {
        let dictionary = match &config.dictionary_path {
            Some(path) => DictionaryHandle::from_file(path)?,
            None => DictionaryHandle::default(),
        };
        Self::with_dictionary(storage, config, Arc::new(dictionary))
    }

    /// Open an engine sharing a dictionary handle with other components.
    pub fn with_dictionary(
        storage: Arc<dyn Storage>,
        config: EngineConfig,
        dictionary: Arc<DictionaryHandle>,
    ) -> Result<Self> {
        config.validate()?;
        let analyzer = Arc::new(config.analyzer());
        let transactions = TransactionManager::new(
            Arc::clone(&storage),
            config.writer_config(Arc::clone(&analyzer)),
        );
        let parser = DicomQueryParser::new(config.default_field.clone(), Arc::clone(&analyzer))?;
        let reader = IndexReader::open(Arc::clone(&storage))?;
        debug!(
            "opened index engine at generation {} ({} documents)",
            reader.generation(),
            reader.num_docs()
        );

        Ok(IndexEngine {
            config,
            storage,
            analyzer,
            dictionary,
            transactions,
            identities: IndexedIdentitySet::new(),
            parser,
            reader: RwLock::new(Arc::new(reader)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn dictionary(&self) -> &Arc<DictionaryHandle> {
        &self.dictionary
    }

    pub fn query_parser(&self) -> &DicomQueryParser {
        &self.parser
    }

    pub fn identities(&self) -> &IndexedIdentitySet {
        &self.identities
    }

    /// Re-read the tag dictionary file. Items already being indexed finish
    /// with the dictionary they started with.
    pub fn reload_dictionary(&self) -> Result<()> {
        self.dictionary.reload()
    }

    pub fn handles(&self, uri: &str) -> bool {
        source::handles(uri)
    }

    /// Open a transaction spanning several calls. Indexing calls made while it
    /// is open share its writer; their changes are committed as each call
    /// ends and the writer closes when the last transaction ends.
    pub fn transaction(&self) -> Result<TransactionGuard<'_>> {
        self.transactions.transaction()
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.transactions.stats()
    }

    /// Index one item in its own transaction.
    pub fn index_one(&self, item: &dyn IngestItem) -> IndexReport {
        let mut report = IndexReport::new();
        if !self.handles(item.uri()) {
            debug!("not handling {}", item.uri());
            report.record(IndexOutcome::Skipped);
            return report.finish();
        }

        let guard = match self.transactions.transaction() {
            Ok(guard) => guard,
            Err(e) => {
                error!("cannot index {}: {e}", item.uri());
                report.add_error();
                return report.finish();
            }
        };
        let mut submitted = Vec::new();
        self.index_into(item, &mut report, &mut submitted);
        if let Err(e) = guard.finish() {
            error!("error in last commit: {e}");
            self.abandon(&submitted, &mut report);
        }
        report.finish()
    }

    /// Index many items in one transaction. A failing item is counted and
    /// the batch goes on.
    pub fn index_batch(&self, items: &[Arc<dyn IngestItem>]) -> IndexReport {
        let mut report = IndexReport::new();
        let guard = match self.transactions.transaction() {
            Ok(guard) => guard,
            Err(e) => {
                error!("cannot index batch of {} items: {e}", items.len());
                report.add_error();
                return report.finish();
            }
        };

        let mut submitted = Vec::new();
        for item in items {
            if !self.handles(item.uri()) {
                debug!("not handling {}", item.uri());
                report.record(IndexOutcome::Skipped);
                continue;
            }
            self.index_into(item.as_ref(), &mut report, &mut submitted);
        }

        if let Err(e) = guard.finish() {
            error!("error in last commit: {e}");
            self.abandon(&submitted, &mut report);
        }
        let report = report.finish();
        info!("finished indexing batch: {report}");
        report
    }

    /// Index one item on the blocking thread pool.
    pub fn spawn_index(self: &Arc<Self>, item: Arc<dyn IngestItem>) -> JoinHandle<IndexReport> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.index_one(item.as_ref()))
    }

    /// Index a batch on the blocking thread pool.
    pub fn spawn_index_batch(
        self: &Arc<Self>,
        items: Vec<Arc<dyn IngestItem>>,
    ) -> JoinHandle<IndexReport> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.index_batch(&items))
    }

    fn index_into(
        &self,
        item: &dyn IngestItem,
        report: &mut IndexReport,
        submitted: &mut Vec<String>,
    ) {
        match self.index_item(item, submitted) {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                error!("failed to index {}: {e}", item.uri());
                report.add_error();
            }
        }
    }

    /// The transaction of an indexing call failed to end: its documents may
    /// be lost, so none of them count as indexed and their instance
    /// identifiers may be submitted again.
    fn abandon(&self, submitted: &[String], report: &mut IndexReport) {
        for uid in submitted {
            self.identities.remove(uid);
        }
        report.fail_indexed();
    }

    /// Decode, deduplicate, extract and submit one item. A transaction must
    /// be open. The instance identifier of a submitted document is pushed to
    /// `submitted`.
    fn index_item(&self, item: &dyn IngestItem, submitted: &mut Vec<String>) -> Result<IndexOutcome> {
        let uri = item.uri();
        if self.is_indexed(&self.config.identity_field, uri)? {
            info!("{uri} is already indexed");
            return Ok(IndexOutcome::Duplicate);
        }

        let dictionary = self.dictionary.current();
        let set = read_file_with(item.open()?, &dictionary)?;
        let uid = set
            .sop_instance_uid()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| MedIndexError::decode(format!("{uri} has no SOP Instance UID")))?;

        if !self.identities.insert(&uid) {
            info!("instance {uid} of {uri} was already submitted");
            return Ok(IndexOutcome::Duplicate);
        }
        match self.is_indexed(&self.config.instance_uid_field, &uid) {
            Ok(false) => {}
            Ok(true) => {
                info!("instance {uid} of {uri} is already indexed");
                return Ok(IndexOutcome::Duplicate);
            }
            Err(e) => {
                self.identities.remove(&uid);
                return Err(e);
            }
        }

        let mut doc = self.build_document(uri, &uid, &set, &dictionary);
        match item.size().and_then(|size| {
            i64::try_from(size).map_err(|_| {
                MedIndexError::size_probe(format!("{size} bytes is beyond the size field range"))
            })
        }) {
            Ok(size) => doc.add_integer(self.config.size_field.as_str(), size),
            Err(e) => warn!("cannot determine the size of {uri}: {e}"),
        }

        if let Err(e) = self.transactions.with_writer(|writer| writer.add_document(&doc)) {
            self.identities.remove(&uid);
            return Err(e);
        }
        debug!("indexed {uri} with {} fields", doc.len());
        submitted.push(uid);
        Ok(IndexOutcome::Indexed)
    }

    fn build_document(
        &self,
        uri: &str,
        uid: &str,
        set: &AttributeSet,
        dictionary: &TagDictionary,
    ) -> Document {
        let mut doc = Document::new();
        doc.add_text(self.config.identity_field.as_str(), uri);

        let extractor = Extractor::new(dictionary).with_prefix_budget(self.config.prefix_budget);
        extractor.add_structured_fields(set, &mut doc);
        if doc.get(&self.config.instance_uid_field).is_none() {
            doc.add_text(self.config.instance_uid_field.as_str(), uid);
        }

        let modality = set.modality().unwrap_or_default();
        let policy = &self.config.modalities;
        if policy.flattens(&modality) {
            let text = extractor.flatten(set, &mut doc, policy.deep_search);
            doc.add_text(self.config.default_field.as_str(), text);
        }
        doc
    }

    /// Whether a live document has exactly `value` in `field`, looking at
    /// uncommitted documents first and then at the latest commit.
    fn is_indexed(&self, field: &str, value: &str) -> Result<bool> {
        let term = self.analyzer.normalize_field(field, value);
        if self.transactions.pending_match(field, &term) {
            return Ok(true);
        }
        let reader = self.reader()?;
        let query = TermQuery::new(field, term);
        for segment in reader.segments() {
            let hits = query.matches(segment.segment())?;
            let live = hits
                .iter()
                .enumerate()
                .any(|(doc, hit)| hit && !segment.is_deleted(doc as u32));
            if live {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The reader for the latest commit, reopened if it changed.
    pub fn reader(&self) -> Result<Arc<IndexReader>> {
        let current = Arc::clone(&self.reader.read());
        let Some(newer) = current.open_if_changed()? else {
            return Ok(current);
        };
        let newer = Arc::new(newer);
        let mut slot = self.reader.write();
        if slot.generation() < newer.generation() {
            *slot = Arc::clone(&newer);
        }
        Ok(newer)
    }

    /// Live documents in the latest commit.
    pub fn num_docs(&self) -> Result<usize> {
        Ok(self.reader()?.num_docs())
    }

    /// Run a query and stream its results with the stored values of
    /// `fields`.
    pub fn query(&self, text: &str, fields: &[&str]) -> Result<ResultStream> {
        let query = self.parser.parse(text)?;
        let reader = self.reader()?;
        debug!(
            "querying generation {} for {}",
            reader.generation(),
            query.description()
        );
        Ok(ResultStream::new(
            &reader,
            query,
            self.config.identity_field.as_str(),
            fields.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Run a query and collect every result.
    pub fn search(&self, text: &str, fields: &[&str]) -> Result<Vec<SearchResult>> {
        self.query(text, fields)?.collect()
    }

    /// Exact-match query on the identity field.
    fn identity_query(&self, uri: &str) -> Result<Box<dyn Query>> {
        if uri.trim().is_empty() {
            return Err(MedIndexError::parse("empty URI"));
        }
        let mut escaped = String::with_capacity(uri.len() + 8);
        for c in uri.chars() {
            if matches!(c, '\\' | '"' | '/') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        self.parser
            .parse(&format!("{}:\"{escaped}\"", self.config.identity_field))
    }

    /// Remove every document whose identity is `uri`.
    ///
    /// Returns `false` when the URI cannot be turned into a query or the
    /// deletion fails; a failed deletion also drops the shared writer. Once
    /// the deletion is committed, the instance identifiers of the removed
    /// documents are forgotten so the objects can be indexed again.
    pub fn unindex(&self, uri: &str) -> bool {
        let query = match self.identity_query(uri) {
            Ok(query) => query,
            Err(e) => {
                warn!("cannot unindex {uri:?}: {e}");
                return false;
            }
        };

        match self.delete_documents(query.as_ref()) {
            Ok(uids) => {
                for uid in &uids {
                    self.identities.remove(uid);
                }
                debug!("unindexed {uri} ({} documents)", uids.len());
                true
            }
            Err(e) => {
                error!("failed to unindex {uri}: {e}");
                self.transactions.invalidate();
                false
            }
        }
    }

    /// Delete the documents matching `query` in a transaction of its own and
    /// return the instance identifiers they carried.
    fn delete_documents(&self, query: &dyn Query) -> Result<Vec<String>> {
        let uid_field = self.config.instance_uid_field.as_str();
        let guard = self.transactions.transaction()?;
        let uids = match self.transactions.with_writer(|writer| {
            let uids = writer.matching_stored_values(query, uid_field)?;
            writer.delete_documents(query)?;
            Ok(uids)
        }) {
            Ok(uids) => uids,
            Err(e) => {
                self.transactions.invalidate();
                return Err(e);
            }
        };
        guard.finish()?;
        Ok(uids
            .iter()
            .filter_map(|v| v.as_text())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::{Tag, VR, write_file};
    use crate::source::MemoryItem;
    use crate::storage::memory::MemoryStorage;

    fn engine() -> IndexEngine {
        IndexEngine::with_storage(
            Arc::new(MemoryStorage::default()),
            EngineConfig::builder().index_all_modalities().build(),
        )
        .unwrap()
    }

    fn item(uri: &str, uid: &str) -> MemoryItem {
        MemoryItem::new(uri, encoded(uid))
    }

    fn encoded(uid: &str) -> Vec<u8> {
        let mut set = AttributeSet::new();
        set.put_str(Tag::SOP_INSTANCE_UID, VR::UI, uid)
            .put_str(Tag::MODALITY, VR::CS, "CT")
            .put_str(Tag(0x0010, 0x0010), VR::PN, "SALVADOR^DALI");
        let mut bytes = Vec::new();
        write_file(&set, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_index_and_query() {
        let engine = engine();
        let report = engine.index_one(&item("mem://a.dcm", "1.2.3"));
        assert_eq!((report.indexed, report.errors), (1, 0));

        let results = engine.search("PatientName:dali", &["Modality"]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "mem://a.dcm");
        assert_eq!(
            results[0].get("Modality").and_then(|v| v.as_text()),
            Some("CT")
        );
    }

    #[test]
    fn test_unhandled_item_is_skipped() {
        let engine = engine();
        let report = engine.index_one(&MemoryItem::new("mem://a.png", vec![]));
        assert_eq!(report.skipped, 1);
        assert_eq!(engine.transaction_stats().opened, 0);
    }

    #[test]
    fn test_identity_query_escapes() {
        let engine = engine();
        let query = engine.identity_query("file:/a \"b\"/c\\d.dcm").unwrap();
        let term = query.as_any().downcast_ref::<TermQuery>().unwrap();
        assert_eq!(term.field(), "uri");
        assert_eq!(term.term(), "file:/a \"b\"/c\\d.dcm");
        assert!(engine.identity_query("  ").is_err());
        assert!(!engine.unindex(""));
    }

    #[test]
    fn test_unindex_forgets_uncommitted_documents() {
        let engine = engine();
        let guard = engine.transaction().unwrap();
        let doc = Document::new()
            .with_field("uri", "mem://pending.dcm")
            .with_field("SOPInstanceUID", "1.2.9");
        engine
            .transactions
            .with_writer(|writer| writer.add_document(&doc))
            .unwrap();
        assert!(engine.identities().insert("1.2.9"));

        assert!(engine.unindex("mem://pending.dcm"));
        assert!(!engine.identities().contains("1.2.9"));
        guard.finish().unwrap();
        assert_eq!(engine.num_docs().unwrap(), 0);
    }

    #[derive(Debug)]
    struct HugeItem(Vec<u8>);

    impl IngestItem for HugeItem {
        fn uri(&self) -> &str {
            "mem://huge.dcm"
        }

        fn open(&self) -> Result<Box<dyn std::io::Read + Send + '_>> {
            Ok(Box::new(self.0.as_slice()))
        }

        fn size(&self) -> Result<u64> {
            Ok(u64::MAX)
        }
    }

    #[test]
    fn test_size_beyond_field_range_is_dropped() {
        let engine = engine();
        let report = engine.index_one(&HugeItem(encoded("1.2.3")));
        assert_eq!((report.indexed, report.errors), (1, 0));

        let results = engine.search("uri:\"mem://huge.dcm\"", &["FileSize"]).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].get("FileSize").is_none());
    }

    #[test]
    fn test_unindex_allows_reindexing() {
        let engine = engine();
        engine.index_one(&item("mem://a.dcm", "1.2.3"));
        assert!(engine.unindex("mem://a.dcm"));
        assert_eq!(engine.num_docs().unwrap(), 0);
        assert!(!engine.identities().contains("1.2.3"));

        let report = engine.index_one(&item("mem://a.dcm", "1.2.3"));
        assert_eq!(report.indexed, 1);
    }
}
