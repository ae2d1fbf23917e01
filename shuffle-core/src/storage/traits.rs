// shuffle-core/src/storage/traits.rs

//! Filesystem seam used by the record readers and writers.
//!
//! Everything the shuffle touches on disk (input, buckets, output, the
//! working directory) goes through `StorageBackend`, which keeps the
//! orchestration testable against fault-injecting backends.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size in bytes.
    pub size: u64,
    /// Whether the object is a directory.
    pub is_dir: bool,
}

/// Read handle with random access, needed to locate record-file trailers.
pub trait StorageReader: Read + Seek + Send {
    /// Total size of the object in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `length` bytes starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range runs past the end of the object.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// Append-only write handle.
///
/// Dropping a writer without calling `finish` releases the handle but does
/// not guarantee the data reached disk.
pub trait StorageWriter: Write + Send {
    /// Flushes and syncs the object. The writer is consumed.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Operations the shuffle needs from a storage system.
pub trait StorageBackend: Send + Sync {
    /// Checks whether an object or directory exists.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// A spelling of `path` that is equal for every path naming the same
    /// object, such as `data.rec` and `./data.rec`. The object does not
    /// have to exist yet.
    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    /// Metadata for an object.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Opens an existing object for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Creates (or truncates) an object for writing. Parent directories are
    /// created as needed.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Like `open_write`, with an explicit write buffer size. Zero means
    /// every write goes straight through. Backends without their own
    /// buffering ignore the hint.
    fn open_write_buffered(
        &self,
        path: &Path,
        _buffer_size: usize,
    ) -> Result<Box<dyn StorageWriter>> {
        self.open_write(path)
    }

    /// Deletes a single object.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Recursively removes a directory and everything under it.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Lists entry names directly under `dir`, sorted. A missing directory
    /// lists as empty.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Creates a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
