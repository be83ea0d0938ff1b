//! Reference-counted write sessions around the single index writer.
//!
//! The writer exists exactly while at least one transaction is open. The
//! first [`TransactionManager::begin`] opens it, every
//! [`TransactionManager::end`] commits, and the last one closes it. Nested
//! and concurrent sessions therefore share one writer: a batch holds it open
//! across all of its items while single submissions still compose with it.
//!
//! A writer that fails to commit is discarded without committing, and its
//! uncommitted changes are lost. Every transaction that was open at that
//! moment reports the failure when it ends, even if its own commit succeeds
//! on a fresh writer.

use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::error::{MedIndexError, Result};
use crate::lexical::index::{IndexWriter, IndexWriterConfig};
use crate::storage::Storage;

/// Lifecycle counters, for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    /// Times the writer was opened.
    pub opened: u64,
    /// Times the writer was closed.
    pub closed: u64,
    /// Commits performed at the end of a transaction.
    pub commits: u64,
    /// Times a broken writer was dropped after an I/O failure.
    pub invalidated: u64,
}

#[derive(Debug, Default)]
struct State {
    depth: usize,
    writer: Option<IndexWriter>,
    /// Bumped each time a writer is discarded.
    epoch: u64,
    stats: TransactionStats,
}

impl State {
    /// Drop the writer without committing its pending changes.
    fn discard_writer(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.abort();
            self.epoch += 1;
            self.stats.closed += 1;
            self.stats.invalidated += 1;
            warn!("index writer invalidated");
        }
    }
}

/// Owns the writer and the transaction count guarding it.
pub struct TransactionManager {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,
    state: Mutex<State>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionManager")
            .field("depth", &state.depth)
            .field("writer_open", &state.writer.is_some())
            .field("stats", &state.stats)
            .finish()
    }
}

impl TransactionManager {
    pub fn new(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Self {
        TransactionManager {
            storage,
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Enter a transaction, opening the writer if none is open.
    pub fn begin(&self) -> Result<()> {
        self.enter().map(|_| ())
    }

    /// Enter a transaction and return the writer epoch it started in.
    fn enter(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.writer.is_none() {
            self.open_writer(&mut state)?;
        }
        state.depth += 1;
        Ok(state.epoch)
    }

    fn open_writer(&self, state: &mut State) -> Result<()> {
        let writer = IndexWriter::open(Arc::clone(&self.storage), self.config.clone())
            .map_err(|e| {
                error!("cannot open index writer: {e}");
                MedIndexError::index(format!("cannot open index writer: {e}"))
            })?;
        state.writer = Some(writer);
        state.stats.opened += 1;
        debug!("index writer opened");
        Ok(())
    }

    /// Leave a transaction: commit, and close the writer if this was the last.
    ///
    /// A failed commit discards the writer.
    pub fn end(&self) -> Result<()> {
        self.leave(None)
    }

    fn leave(&self, began: Option<u64>) -> Result<()> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            warn!("transaction end without a matching begin");
            return Err(MedIndexError::index("no open transaction"));
        }
        state.depth -= 1;

        if let Some(writer) = state.writer.as_mut() {
            if let Err(e) = writer.commit() {
                error!("commit failed: {e}");
                state.discard_writer();
                return Err(MedIndexError::index(format!("commit failed: {e}")));
            }
            state.stats.commits += 1;
        }

        if state.depth == 0 {
            if let Some(mut writer) = state.writer.take() {
                if let Err(e) = writer.close() {
                    warn!("closing index writer failed: {e}");
                }
                state.stats.closed += 1;
                debug!("index writer closed");
            }
        }

        match began {
            Some(epoch) if epoch != state.epoch => Err(MedIndexError::index(
                "index writer was invalidated during the transaction",
            )),
            _ => Ok(()),
        }
    }

    /// Open a transaction that ends when the guard is finished or dropped.
    pub fn transaction(&self) -> Result<TransactionGuard<'_>> {
        let epoch = self.enter()?;
        Ok(TransactionGuard {
            manager: self,
            epoch,
            active: true,
        })
    }

    /// Run `f` on the writer of the open transactions.
    ///
    /// A writer invalidated while transactions are open is reopened here.
    pub fn with_writer<T>(&self, f: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            return Err(MedIndexError::index("no open transaction"));
        }
        if state.writer.is_none() {
            self.open_writer(&mut state)?;
        }
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| MedIndexError::index("no open index writer"))?;
        f(writer)
    }

    /// Whether the open writer holds an uncommitted document with `term`.
    pub fn pending_match(&self, field: &str, term: &str) -> bool {
        self.state
            .lock()
            .writer
            .as_ref()
            .is_some_and(|writer| writer.pending_match(field, term))
    }

    /// Drop the writer after an I/O failure, without committing, so that the
    /// next operation starts from a fresh one. Open transactions stay counted.
    pub fn invalidate(&self) {
        self.state.lock().discard_writer();
    }

    /// Number of open transactions.
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    pub fn is_writer_open(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    pub fn stats(&self) -> TransactionStats {
        self.state.lock().stats
    }
}

/// An open transaction.
///
/// Prefer [`TransactionGuard::finish`], which reports commit failures and
/// writer invalidations that happened while the transaction was open.
/// Dropping the guard ends the transaction too, logging any failure.
#[derive(Debug)]
pub struct TransactionGuard<'a> {
    manager: &'a TransactionManager,
    epoch: u64,
    active: bool,
}

impl TransactionGuard<'_> {
    pub fn finish(mut self) -> Result<()> {
        self.active = false;
        self.manager.leave(Some(self.epoch))
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.manager.leave(Some(self.epoch)) {
                error!("ending transaction failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::core::Document;
    use crate::storage::memory::MemoryStorage;

    fn manager() -> TransactionManager {
        TransactionManager::new(
            Arc::new(MemoryStorage::default()),
            IndexWriterConfig::default(),
        )
    }

    #[test]
    fn test_writer_lives_while_transactions_are_open() {
        let manager = manager();
        assert!(!manager.is_writer_open());

        manager.begin().unwrap();
        manager.begin().unwrap();
        assert!(manager.is_writer_open());
        assert_eq!(manager.depth(), 2);

        manager.end().unwrap();
        assert!(manager.is_writer_open());
        manager.end().unwrap();
        assert!(!manager.is_writer_open());

        let stats = manager.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.commits, 2);
    }

    #[test]
    fn test_unbalanced_end() {
        let manager = manager();
        assert!(manager.end().is_err());
        assert_eq!(manager.depth(), 0);
    }

    #[test]
    fn test_guard_ends_on_drop() {
        let manager = manager();
        {
            let _guard = manager.transaction().unwrap();
            manager
                .with_writer(|w| w.add_document(&Document::new().with_field("uri", "a")))
                .unwrap();
            assert!(manager.pending_match("uri", "a"));
        }
        assert_eq!(manager.depth(), 0);
        assert!(!manager.pending_match("uri", "a"));
        assert!(manager.with_writer(|_| Ok(())).is_err());
    }

    #[test]
    fn test_invalidate_reopens_on_next_begin() {
        let manager = manager();
        let guard = manager.transaction().unwrap();
        manager.invalidate();
        assert!(!manager.is_writer_open());
        manager.begin().unwrap();
        assert!(manager.is_writer_open());
        manager.end().unwrap();

        manager.invalidate();
        manager
            .with_writer(|w| w.add_document(&Document::new().with_field("uri", "b")))
            .unwrap();
        // The changes made on the fresh writer are committed, but the
        // transaction still reports that it lost its earlier writer.
        assert!(guard.finish().is_err());
        assert_eq!(manager.depth(), 0);

        let stats = manager.stats();
        assert_eq!(stats.opened, 3);
        assert_eq!(stats.invalidated, 2);
        assert_eq!(stats.closed, 3);
    }

    #[test]
    fn test_invalidate_drops_uncommitted_changes() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let manager = TransactionManager::new(Arc::clone(&storage), IndexWriterConfig::default());
        manager.begin().unwrap();
        manager
            .with_writer(|w| w.add_document(&Document::new().with_field("uri", "a")))
            .unwrap();
        manager.invalidate();
        assert!(!manager.pending_match("uri", "a"));
        manager.end().unwrap();

        let reader = crate::lexical::index::IndexReader::open(storage).unwrap();
        assert_eq!(reader.num_docs(), 0);
    }

    #[test]
    fn test_unrelated_transactions_are_not_failed() {
        let manager = manager();
        let first = manager.transaction().unwrap();
        first.finish().unwrap();
        manager.invalidate();
        let second = manager.transaction().unwrap();
        second.finish().unwrap();
        assert_eq!(manager.stats().invalidated, 0);
    }
}
