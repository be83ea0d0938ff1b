//! Pluggable storage backends for index files.
//!
//! The index never touches the filesystem directly. Segment files and commit
//! points go through a [`Storage`] implementation, which lets the same engine
//! run against [`memory::MemoryStorage`] in tests and [`file::FileStorage`] in
//! production.
//!
//! # Examples
//!
//! ```
//! use medindex::storage::{StorageConfig, StorageFactory};
//! use medindex::storage::memory::MemoryStorageConfig;
//!
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default())).unwrap();
//! medindex::storage::write_atomic(storage.as_ref(), "hello.txt", b"hello").unwrap();
//! assert_eq!(medindex::storage::read_all(storage.as_ref(), "hello.txt").unwrap(), b"hello");
//! ```

pub mod file;
pub mod memory;

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

/// A readable file handle obtained from a [`Storage`].
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable file handle obtained from a [`Storage`].
///
/// Data becomes visible to other handles only once [`StorageOutput::close`]
/// returns.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffered data and sync it to the backing medium.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush, sync and publish the file.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A flat namespace of named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Atomically rename a file, replacing the destination if it exists.
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Volatile in-process storage.
    Memory(MemoryStorageConfig),
    /// Directory-backed storage.
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Factory for creating storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend for the given configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}

/// Read a whole file into memory.
pub fn read_all(storage: &dyn Storage, name: &str) -> Result<Vec<u8>> {
    let mut input = storage.open_input(name)?;
    let mut buf = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Write a whole file so that readers see either the old or the new content.
///
/// The bytes are written to a temporary name first and renamed into place.
pub fn write_atomic(storage: &dyn Storage, name: &str, bytes: &[u8]) -> Result<()> {
    let tmp = format!("{name}.tmp");
    let mut output = storage.create_output(&tmp)?;
    output.write_all(bytes)?;
    output.close()?;
    storage.rename(&tmp, name)
}
