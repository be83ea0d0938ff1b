//! Core data structures: typed fields and documents.

pub mod document;
pub mod field;

pub use document::{AnalyzedDocument, Document};
pub use field::{Field, FieldValue, POINT_FIELD_PREFIX, StoredValue, point_field_name};
