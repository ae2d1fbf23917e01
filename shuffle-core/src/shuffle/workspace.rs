// shuffle-core/src/shuffle/workspace.rs

//! Temporary bucket files owned by one shuffle job.
//!
//! Layout of a working directory:
//!
//! ```text
//! <parent>/.shuffle-<uuid>/
//!     bucket-00000.rec
//!     bucket-00001.rec
//!     ...
//! ```
//!
//! Bucket files are named by index, so cleanup can find them by listing the
//! directory without keeping a manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Result, ShuffleError};
use crate::records::{Record, RecordFileReader, RecordFileWriter, RecordSink, WriterOptions};
use crate::storage::StorageBackend;

const WORKDIR_PREFIX: &str = ".shuffle-";
const BUCKET_PREFIX: &str = "bucket-";
const BUCKET_SUFFIX: &str = ".rec";

/// File name of bucket `index` inside a working directory.
pub fn bucket_file_name(index: usize) -> String {
    format!("{BUCKET_PREFIX}{index:05}{BUCKET_SUFFIX}")
}

fn is_bucket_file(name: &str) -> bool {
    name.starts_with(BUCKET_PREFIX) && name.ends_with(BUCKET_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketState {
    Writing,
    Closed,
    Deleted,
}

/// One append-only partition of the input.
pub struct Bucket {
    index: usize,
    path: PathBuf,
    writer: Option<RecordFileWriter>,
    records: u64,
    state: BucketState,
}

impl Bucket {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended so far.
    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Finishes the bucket file. Closing twice is a no-op.
    fn close(&mut self) -> Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
            self.state = BucketState::Closed;
        }
        Ok(self.records)
    }
}

impl RecordSink for Bucket {
    fn append(&mut self, record: &Record) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            ShuffleError::storage(&self.path, "bucket is closed for writing")
        })?;
        writer.write_record(record)?;
        self.records += 1;
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.records
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.close()
    }

    fn buffered_bytes(&self) -> usize {
        self.writer.as_ref().map_or(0, RecordFileWriter::buffered_bytes)
    }

    fn flush_buffer(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush_buffer(),
            None => Ok(()),
        }
    }
}

/// The working directory of a job and the buckets inside it.
///
/// Dropping a workspace that was not cleaned up removes it on a best-effort
/// basis.
pub struct BucketWorkspace {
    storage: Arc<dyn StorageBackend>,
    dir: PathBuf,
    buckets: Vec<Bucket>,
    cleaned: bool,
}

impl BucketWorkspace {
    /// Creates a fresh working directory under `parent` holding `count`
    /// empty buckets.
    ///
    /// If any bucket cannot be created, whatever was already created is
    /// removed before the error is returned.
    pub fn create(
        storage: Arc<dyn StorageBackend>,
        parent: &Path,
        count: usize,
        options: WriterOptions,
    ) -> Result<Self> {
        if count == 0 {
            return Err(ShuffleError::config("a shuffle needs at least one bucket"));
        }

        let dir = parent.join(format!("{WORKDIR_PREFIX}{}", Uuid::new_v4()));
        storage.create_dir_all(&dir)?;

        let mut workspace = Self {
            storage,
            dir,
            buckets: Vec::with_capacity(count),
            cleaned: false,
        };

        for index in 0..count {
            if let Err(e) = workspace.add_bucket(index, options) {
                for cleanup_error in workspace.cleanup() {
                    tracing::warn!("{}", cleanup_error);
                }
                return Err(e);
            }
        }

        tracing::debug!("Created {} buckets in {}", count, workspace.dir.display());
        Ok(workspace)
    }

    fn add_bucket(&mut self, index: usize, options: WriterOptions) -> Result<()> {
        let path = self.dir.join(bucket_file_name(index));
        let writer = RecordFileWriter::create(self.storage.as_ref(), &path, options)?;
        self.buckets.push(Bucket {
            index,
            path,
            writer: Some(writer),
            records: 0,
            state: BucketState::Writing,
        });
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Buckets in index order, for partitioning.
    pub fn buckets_mut(&mut self) -> &mut [Bucket] {
        &mut self.buckets
    }

    /// Finishes bucket `index` and opens it for reading.
    pub fn reopen(&mut self, index: usize) -> Result<RecordFileReader> {
        let bucket = self.bucket_mut(index)?;
        if bucket.state == BucketState::Deleted {
            return Err(ShuffleError::storage(&bucket.path, "bucket was already drained"));
        }
        bucket.close()?;
        RecordFileReader::open(self.storage.as_ref(), &self.buckets[index].path)
    }

    /// Deletes the file of a drained bucket.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        let storage = Arc::clone(&self.storage);
        let bucket = self.bucket_mut(index)?;
        if bucket.state == BucketState::Deleted {
            return Ok(());
        }
        bucket.writer = None;
        storage.delete(&bucket.path)?;
        bucket.state = BucketState::Deleted;
        Ok(())
    }

    fn bucket_mut(&mut self, index: usize) -> Result<&mut Bucket> {
        let dir = &self.dir;
        self.buckets
            .get_mut(index)
            .ok_or_else(|| ShuffleError::storage(dir, format!("no bucket {index}")))
    }

    /// Releases every bucket and removes the working directory.
    ///
    /// Keeps going after a failure; every failure is returned, none is
    /// raised. Calling this again after it succeeded does nothing.
    pub fn cleanup(&mut self) -> Vec<ShuffleError> {
        if self.cleaned {
            return Vec::new();
        }

        let mut errors = Vec::new();

        // Open handles first, so deletes also work where open files are locked.
        for bucket in &mut self.buckets {
            bucket.writer = None;
        }

        match self.storage.list(&self.dir) {
            Ok(names) => {
                for name in names.iter().filter(|n| is_bucket_file(n)) {
                    let path = self.dir.join(name);
                    if let Err(e) = self.storage.delete(&path) {
                        errors.push(ShuffleError::cleanup(path, e));
                    }
                }
            }
            Err(e) => errors.push(ShuffleError::cleanup(&self.dir, e)),
        }
        for bucket in &mut self.buckets {
            bucket.state = BucketState::Deleted;
        }

        if let Err(e) = self.storage.remove_dir_all(&self.dir) {
            errors.push(ShuffleError::cleanup(&self.dir, e));
        }

        self.cleaned = true;
        errors
    }
}

impl Drop for BucketWorkspace {
    fn drop(&mut self) {
        for error in self.cleanup() {
            tracing::warn!("{}", error);
        }
    }
}
