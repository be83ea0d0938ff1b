//! Error types for medindex.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`MedIndexError`]. The variants follow the failure classes of the engine:
//! per-item decode failures, index writer failures, query/URI parse failures and
//! size probes, plus the usual I/O and serialization wrappers.

use thiserror::Error;

/// The error type for all medindex operations.
#[derive(Debug, Error)]
pub enum MedIndexError {
    /// Malformed or unreadable attribute data for a single item.
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure of the index writer (open, add, delete, commit, close) or of
    /// the persisted index files it manages.
    #[error("index error: {0}")]
    Index(String),

    /// Malformed query text or an identity that cannot be turned into a query.
    #[error("parse error: {0}")]
    Parse(String),

    /// The storage backend could not report the size of an item.
    #[error("size probe failed: {0}")]
    SizeProbe(String),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// An argument was outside of what the operation accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl MedIndexError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        MedIndexError::Decode(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        MedIndexError::Index(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        MedIndexError::Parse(msg.into())
    }

    pub fn size_probe<S: Into<String>>(msg: S) -> Self {
        MedIndexError::SizeProbe(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        MedIndexError::Storage(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        MedIndexError::InvalidArgument(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        MedIndexError::InvalidConfig(msg.into())
    }

    /// Whether this error came from decoding a single item.
    ///
    /// Decode errors are isolated to the item they belong to and never abort
    /// a batch.
    pub fn is_decode(&self) -> bool {
        matches!(self, MedIndexError::Decode(_))
    }
}

/// Result type alias for medindex operations.
pub type Result<T> = std::result::Result<T, MedIndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_display() {
        let err = MedIndexError::parse("unbalanced parenthesis");
        assert_eq!(err.to_string(), "parse error: unbalanced parenthesis");

        let err = MedIndexError::decode("missing DICM prefix");
        assert!(err.is_decode());
        assert!(!MedIndexError::index("closed").is_decode());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: MedIndexError = io.into();
        assert!(matches!(err, MedIndexError::Io(_)));
    }
}
