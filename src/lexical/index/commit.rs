//! Commit points.
//!
//! Each commit writes `commit_<generation>.json` naming the live segments and
//! their deleted ordinals. The highest generation present in storage is the
//! current state of the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MedIndexError, Result};
use crate::storage::{self, Storage};

const COMMIT_PREFIX: &str = "commit_";
const COMMIT_SUFFIX: &str = ".json";
const SEGMENT_SUFFIX: &str = ".seg";

/// A segment as recorded in a commit point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub doc_count: u32,
    /// Ordinals of deleted documents, ascending.
    #[serde(default)]
    pub deleted: Vec<u32>,
}

impl SegmentInfo {
    pub fn live_docs(&self) -> u32 {
        self.doc_count.saturating_sub(self.deleted.len() as u32)
    }
}

/// The persisted description of one index generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPoint {
    pub generation: u64,
    pub segments: Vec<SegmentInfo>,
    /// Counter used to name the next new segment.
    pub next_segment_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl CommitPoint {
    /// File name of the commit point for `generation`.
    pub fn file_name(generation: u64) -> String {
        format!("{COMMIT_PREFIX}{generation}{COMMIT_SUFFIX}")
    }

    /// Parse a generation out of a commit file name.
    pub fn parse_generation(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(COMMIT_PREFIX)?
            .strip_suffix(COMMIT_SUFFIX)?
            .parse()
            .ok()
    }

    /// All committed generations, ascending.
    pub fn generations(storage: &dyn Storage) -> Result<Vec<u64>> {
        let mut generations: Vec<u64> = storage
            .list_files()?
            .iter()
            .filter_map(|name| Self::parse_generation(name))
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }

    /// The newest generation, or `None` for an index that was never committed.
    pub fn latest_generation(storage: &dyn Storage) -> Result<Option<u64>> {
        Ok(Self::generations(storage)?.last().copied())
    }

    pub fn load(storage: &dyn Storage, generation: u64) -> Result<Self> {
        let bytes = storage::read_all(storage, &Self::file_name(generation))?;
        let commit: CommitPoint = serde_json::from_slice(&bytes)?;
        if commit.generation != generation {
            return Err(MedIndexError::index(format!(
                "commit file for generation {generation} records generation {}",
                commit.generation
            )));
        }
        Ok(commit)
    }

    pub fn load_latest(storage: &dyn Storage) -> Result<Option<Self>> {
        match Self::latest_generation(storage)? {
            Some(generation) => Ok(Some(Self::load(storage, generation)?)),
            None => Ok(None),
        }
    }

    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        storage::write_atomic(storage, &Self::file_name(self.generation), &bytes)
    }

    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_docs() as u64).sum()
    }
}

/// Storage file name of a segment.
pub fn segment_file_name(segment: &str) -> String {
    format!("{segment}{SEGMENT_SUFFIX}")
}

/// Segment name of a storage file, if it is a segment file.
pub fn parse_segment_file_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(SEGMENT_SUFFIX)
}
