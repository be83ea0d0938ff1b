//! Text analysis for indexing and query parsing.
//!
//! An [`Analyzer`] turns field text into the terms stored in the inverted index.
//! The same analyzer must be applied to query text so that `PatientName:Salvador`
//! matches a value indexed as `SALVADOR^DALI`.
//!
//! - [`StandardAnalyzer`]: Unicode word segmentation, NFC, lowercase
//! - [`KeywordAnalyzer`]: the whole value as a single exact term
//! - [`PerFieldAnalyzer`]: chooses an analyzer by field name

pub mod keyword;
pub mod per_field;
pub mod standard;

pub use keyword::KeywordAnalyzer;
pub use per_field::PerFieldAnalyzer;
pub use standard::StandardAnalyzer;

/// A single term produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The normalized term text.
    pub text: String,
    /// Position of the token in the token stream.
    pub position: u32,
    /// Byte offset of the token start in the original text.
    pub start_offset: usize,
    /// Byte offset of the token end in the original text.
    pub end_offset: usize,
}

impl Token {
    pub fn new<S: Into<String>>(text: S, position: u32, start_offset: usize, end_offset: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}

/// Converts text into a stream of tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Split and normalize text into tokens.
    fn analyze(&self, text: &str) -> Vec<Token>;

    /// Normalize a single query term without splitting it.
    ///
    /// Used for wildcard, regexp and range terms, which must not be tokenized
    /// but still need the same case folding as indexed terms.
    fn normalize(&self, term: &str) -> String;

    /// Name of this analyzer, for debugging.
    fn name(&self) -> &'static str;
}
