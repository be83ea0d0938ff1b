//! # MedIndex
//!
//! Metadata indexing and query engine for DICOM objects.
//!
//! ## Features
//!
//! - DICOM Part 10 decoding of the attribute data set
//! - Dictionary-driven field extraction and recursive sequence flattening
//! - Reference-counted write transactions with duplicate suppression
//! - Boolean query language with typed numeric ranges
//! - Lazy result streams over the latest committed generation
//! - Pluggable storage backends

pub mod analysis;
pub mod dicom;
pub mod engine;
pub mod error;
pub mod lexical;
pub mod plugin;
pub mod source;
pub mod storage;

pub use dicom::{AttributeSet, DictionaryHandle, ModalityPolicy, Tag, TagDictionary, VR};
pub use engine::IndexEngine;
pub use engine::config::{EngineConfig, EngineConfigBuilder};
pub use engine::report::{IndexOutcome, IndexReport};
pub use error::{MedIndexError, Result};
pub use lexical::{Document, FieldValue, ResultStream, SearchResult, StoredValue};
pub use plugin::{Ingestible, Queryable, Removable};
pub use source::{FileItem, IngestItem, MemoryItem};
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
