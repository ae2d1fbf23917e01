// shuffle-core/src/records/mod.rs

//! Record files.
//!
//! A record file is an ordered sequence of opaque byte records. The default
//! layout is the framed format in [`format`], which stores its record count
//! and a checksum in a trailer. Plain newline-delimited, length-prefixed
//! and fixed-size files are handled by [`delimited`].
//!
//! # Example
//!
//! ```no_run
//! use shuffle_core::config::StorageConfig;
//! use shuffle_core::records::{
//!     open_source, Record, RecordFileWriter, RecordLayout, RecordSource, WriterOptions,
//! };
//! use shuffle_core::storage::LocalStorage;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//! let mut writer = RecordFileWriter::create(&storage, Path::new("data.rec"), WriterOptions::default()).unwrap();
//! writer.write_record(&Record::from("hello")).unwrap();
//! writer.finish().unwrap();
//!
//! let source = open_source(&storage, Path::new("data.rec"), RecordLayout::Framed).unwrap();
//! assert_eq!(source.record_count(), 1);
//! ```

pub mod delimited;
pub mod format;
mod memory;
mod reader;
mod traits;
mod writer;

use std::path::Path;

use crate::error::{Result, ShuffleError};
use crate::storage::StorageBackend;

pub use delimited::{DelimitedReader, DelimitedWriter};
pub use format::{CompressionType, FileTrailer};
pub use memory::{MemorySink, MemorySource};
pub use reader::RecordFileReader;
pub use traits::{Record, RecordLayout, RecordSink, RecordSource};
pub use writer::{RecordFileWriter, WriterOptions};

/// Opens a record file for sequential reading.
///
/// # Errors
///
/// `InputNotFound` if nothing exists at `path`, `Format` if the file does not
/// parse as `layout`.
pub fn open_source(
    storage: &dyn StorageBackend,
    path: &Path,
    layout: RecordLayout,
) -> Result<Box<dyn RecordSource>> {
    if !storage.exists(path)? {
        return Err(ShuffleError::input_not_found(path));
    }

    match layout {
        RecordLayout::Framed => Ok(Box::new(RecordFileReader::open(storage, path)?)),
        _ => Ok(Box::new(DelimitedReader::open(storage, path, layout)?)),
    }
}

/// Creates (or truncates) a record file for appending.
///
/// `options` only applies to the framed layout.
pub fn create_sink(
    storage: &dyn StorageBackend,
    path: &Path,
    layout: RecordLayout,
    options: WriterOptions,
) -> Result<Box<dyn RecordSink>> {
    match layout {
        RecordLayout::Framed => Ok(Box::new(RecordFileWriter::create(storage, path, options)?)),
        _ => Ok(Box::new(DelimitedWriter::create(storage, path, layout)?)),
    }
}
