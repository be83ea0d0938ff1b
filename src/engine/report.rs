//! Outcome reports for indexing calls.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a single submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A new document was submitted to the writer.
    Indexed,
    /// The object or its instance identifier is already indexed.
    Duplicate,
    /// The item is not something this engine handles.
    Skipped,
}

/// Aggregated counts for one indexing call.
///
/// A report is produced even when some items failed; `errors` counts them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: u64,
    /// Duplicates and items of unsupported types.
    pub skipped: u64,
    pub errors: u64,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

impl IndexReport {
    pub fn new() -> Self {
        IndexReport {
            indexed: 0,
            skipped: 0,
            errors: 0,
            started: Utc::now(),
            finished: None,
        }
    }

    pub fn record(&mut self, outcome: IndexOutcome) {
        match outcome {
            IndexOutcome::Indexed => self.indexed += 1,
            IndexOutcome::Duplicate | IndexOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Turn every item counted as indexed into an error, after the changes
    /// of the call were lost. The call counts as failed even if it indexed
    /// nothing.
    pub fn fail_indexed(&mut self) {
        self.errors += self.indexed.max(1);
        self.indexed = 0;
    }

    pub fn finish(mut self) -> Self {
        self.finished = Some(Utc::now());
        self
    }

    /// Items seen, whatever happened to them.
    pub fn total(&self) -> u64 {
        self.indexed + self.skipped + self.errors
    }

    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    /// Fold another report into this one, keeping the widest time span.
    pub fn merge(&mut self, other: &IndexReport) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.started = self.started.min(other.started);
        self.finished = match (self.finished, other.finished) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

impl Default for IndexReport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} indexed, {} skipped, {} errors",
            self.indexed, self.skipped, self.errors
        )?;
        if let Some(finished) = self.finished {
            let elapsed = finished - self.started;
            write!(f, " in {} ms", elapsed.num_milliseconds())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_display() {
        let mut report = IndexReport::new();
        report.record(IndexOutcome::Indexed);
        report.record(IndexOutcome::Duplicate);
        report.record(IndexOutcome::Skipped);
        report.add_error();
        assert_eq!(report.total(), 4);
        assert!(!report.is_success());
        assert_eq!(report.to_string(), "1 indexed, 2 skipped, 1 errors");
        assert!(report.finish().to_string().ends_with(" ms"));
    }

    #[test]
    fn test_fail_indexed() {
        let mut report = IndexReport::new();
        report.record(IndexOutcome::Indexed);
        report.record(IndexOutcome::Indexed);
        report.record(IndexOutcome::Duplicate);
        report.fail_indexed();
        assert_eq!((report.indexed, report.skipped, report.errors), (0, 1, 2));

        let mut empty = IndexReport::new();
        empty.fail_indexed();
        assert_eq!(empty.errors, 1);
    }

    #[test]
    fn test_merge() {
        let mut first = IndexReport::new();
        first.record(IndexOutcome::Indexed);
        let mut second = IndexReport::new();
        second.add_error();
        let second = second.finish();

        first.merge(&second);
        assert_eq!(first.indexed, 1);
        assert_eq!(first.errors, 1);
        assert_eq!(first.finished, second.finished);
        assert!(first.started <= second.started);
    }
}
