// shuffle-core/src/storage/mod.rs

//! Storage abstraction used by record readers, writers and the shuffle job.
//!
//! # Example
//!
//! ```no_run
//! use shuffle_core::config::StorageConfig;
//! use shuffle_core::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//! let mut writer = storage.open_write(Path::new("example.bin")).unwrap();
//! writer.write_all(b"payload").unwrap();
//! writer.finish().unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
