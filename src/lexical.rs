//! Lexical search over an inverted index.
//!
//! # Module Structure
//!
//! - `core`: typed fields and documents
//! - `index`: segments, codec, commit points, writer and reader
//! - `query`: query types and the query string parser
//! - `search`: lazy result streams

pub mod core;
pub mod index;
pub mod query;
pub mod search;

pub use self::core::{AnalyzedDocument, Document, Field, FieldValue, StoredValue};
pub use index::{IndexReader, IndexWriter, IndexWriterConfig};
pub use query::{Query, QueryParser};
pub use search::{ResultStream, SearchResult};
