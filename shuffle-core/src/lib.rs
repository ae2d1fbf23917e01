// shuffle-core/src/lib.rs

//! Record Shuffle - Core Library
//!
//! Shuffles record files that do not fit in memory. Records are first
//! scattered at random across on-disk buckets, then each bucket is permuted
//! in memory and appended to the output.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{ShuffleConfig, DEFAULT_BUCKET_SIZE};
pub use error::{Result, ShuffleError};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader, StorageWriter};

pub mod records;
pub use records::{
    create_sink, open_source, CompressionType, Record, RecordFileReader, RecordFileWriter,
    RecordLayout, RecordSink, RecordSource, WriterOptions,
};

pub mod shuffle;
pub use shuffle::{
    bucket_count, BucketShuffler, JobState, LoggingObserver, ShuffleJob, ShuffleObserver,
    ShuffleReport,
};
