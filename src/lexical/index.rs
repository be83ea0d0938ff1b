//! The inverted index: segments, their encoding, commit points, the writer and
//! readers.

pub mod codec;
pub mod commit;
pub mod reader;
pub mod segment;
pub mod writer;

pub use commit::{CommitPoint, SegmentInfo};
pub use reader::{IndexReader, SegmentReader};
pub use segment::{Posting, PostingList, Segment};
pub use writer::{IndexWriter, IndexWriterConfig, WriterStats};
