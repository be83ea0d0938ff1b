//! DICOM attribute sets: decoding, encoding and extraction into documents.
//!
//! [`reader`] turns a Part 10 stream into an [`AttributeSet`], stopping before
//! the pixel data. [`extract`] turns an attribute set into index fields under
//! the control of a [`TagDictionary`].

pub mod attribute;
pub mod charset;
pub mod dictionary;
pub mod extract;
pub mod reader;
pub mod tag;
pub mod vr;
pub mod writer;

pub use attribute::{AttributeSet, Element, Value};
pub use charset::CharacterSet;
pub use dictionary::{DictionaryHandle, ModalityPolicy, TagDictionary, TagEntry};
pub use extract::{DEFAULT_PREFIX_BUDGET, Extractor, add_field};
pub use reader::{Encoding, read_file, read_file_with};
pub use tag::Tag;
pub use vr::VR;
pub use writer::write_file;
