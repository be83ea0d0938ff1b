//! Items submitted for indexing.
//!
//! An [`IngestItem`] is an opaque readable object plus the URI that names it.
//! The engine reads each item fully and never seeks.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{MedIndexError, Result};

/// Something that can be indexed.
pub trait IngestItem: Send + Sync + fmt::Debug {
    /// The identity of the object, stored in the identity field.
    fn uri(&self) -> &str;

    /// A fresh reader over the object's bytes.
    fn open(&self) -> Result<Box<dyn Read + Send + '_>>;

    /// Size of the object in bytes.
    fn size(&self) -> Result<u64>;
}

/// Whether an object with this URI is something the engine indexes.
///
/// Known non-DICOM image formats and NIfTI volumes are refused; anything
/// else, including names without an extension, is accepted.
pub fn handles(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    if lower.ends_with(".nii.gz") {
        return false;
    }
    let Some(dot) = lower.rfind('.') else {
        return true;
    };
    !matches!(
        &lower[dot..],
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".tiff"
    )
}

/// A file on the local filesystem, named by a `file://` URI.
#[derive(Debug, Clone)]
pub struct FileItem {
    path: PathBuf,
    uri: String,
}

impl FileItem {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let uri = format!("file://{}", path.display());
        FileItem { path, uri }
    }

    /// A file indexed under a caller-chosen URI.
    pub fn with_uri<P: AsRef<Path>, S: Into<String>>(path: P, uri: S) -> Self {
        FileItem {
            path: path.as_ref().to_path_buf(),
            uri: uri.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IngestItem for FileItem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        let file = File::open(&self.path).map_err(|e| {
            MedIndexError::decode(format!("cannot open {}: {e}", self.path.display()))
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size(&self) -> Result<u64> {
        std::fs::metadata(&self.path)
            .map(|meta| meta.len())
            .map_err(|e| MedIndexError::size_probe(format!("{}: {e}", self.path.display())))
    }
}

/// An object held in memory.
#[derive(Clone)]
pub struct MemoryItem {
    uri: String,
    data: Vec<u8>,
    size_known: bool,
}

impl MemoryItem {
    pub fn new<S: Into<String>>(uri: S, data: Vec<u8>) -> Self {
        MemoryItem {
            uri: uri.into(),
            data,
            size_known: true,
        }
    }

    /// An item whose size probe fails, as for storage that cannot stat.
    pub fn without_size(mut self) -> Self {
        self.size_known = false;
        self
    }
}

impl fmt::Debug for MemoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryItem")
            .field("uri", &self.uri)
            .field("len", &self.data.len())
            .finish()
    }
}

impl IngestItem for MemoryItem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }

    fn size(&self) -> Result<u64> {
        if self.size_known {
            Ok(self.data.len() as u64)
        } else {
            Err(MedIndexError::size_probe(format!(
                "size of {} is unknown",
                self.uri
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_handles() {
        assert!(handles("file:///data/CT0001.dcm"));
        assert!(handles("file:///data/IM0001"));
        assert!(handles("file:///data/study.dicom"));
        assert!(!handles("file:///data/brain.nii.gz"));
        assert!(!handles("file:///data/scan.JPG"));
        assert!(!handles("file:///data/scan.tiff"));
        assert!(!handles("file:///data/scan.jpeg"));
        assert!(handles("file:///data/scan.gz"));
    }

    #[test]
    fn test_file_item() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"DICM").unwrap();
        let item = FileItem::new(file.path());
        assert!(item.uri().starts_with("file://"));
        assert_eq!(item.size().unwrap(), 4);
        let mut content = Vec::new();
        item.open().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"DICM");

        let missing = FileItem::new("/nonexistent/medindex/item.dcm");
        assert!(matches!(missing.size(), Err(MedIndexError::SizeProbe(_))));
        assert!(matches!(missing.open(), Err(e) if e.is_decode()));
    }

    #[test]
    fn test_memory_item_size() {
        let item = MemoryItem::new("mem://a", vec![1, 2, 3]);
        assert_eq!(item.size().unwrap(), 3);
        assert!(item.without_size().size().is_err());
    }
}
