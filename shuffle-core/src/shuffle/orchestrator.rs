// shuffle-core/src/shuffle/orchestrator.rs

//! Drives a complete shuffle job.
//!
//! A job runs in two phases over a private working directory:
//!
//! 1. Partition: the input is read once and every record is appended to one
//!    of `B` bucket files, chosen uniformly at random.
//! 2. Shuffle: buckets are loaded one at a time, in index order, permuted in
//!    memory and appended to the output. Each bucket file is deleted as soon
//!    as it has been drained.
//!
//! `B` is picked so that a bucket holds about `bucket_size` records, which
//! bounds memory use independently of the input size.
//!
//! A job that fails removes its working directory and the partial output,
//! then returns the error that stopped it. Problems hit during that cleanup
//! are logged and never replace the original error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ShuffleConfig;
use crate::error::{Result, ShuffleError};
use crate::records::{create_sink, open_source, RecordSource, WriterOptions};
use crate::storage::StorageBackend;

use super::bucket::BucketShuffler;
use super::partitioner::partition_with_budget;
use super::progress::{LoggingObserver, ShuffleObserver};
use super::rng::{seeded_rng, ShuffleRng};
use super::workspace::BucketWorkspace;

/// Number of buckets for `total` records at about `hint` records each.
///
/// Always at least one, so an empty input still produces a valid output.
pub fn bucket_count(total: u64, hint: u64) -> Result<usize> {
    if hint == 0 {
        return Err(ShuffleError::config("bucket size must be greater than 0"));
    }

    let count = total.div_ceil(hint).max(1);
    usize::try_from(count)
        .map_err(|_| ShuffleError::config(format!("{count} buckets do not fit in memory")))
}

/// Lifecycle of a shuffle job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Partitioning,
    /// Draining the bucket with this index into the output.
    ShufflingBucket(usize),
    Finalizing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Partitioning => write!(f, "partitioning"),
            Self::ShufflingBucket(index) => write!(f, "shuffling bucket {index}"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a finished job.
#[derive(Debug)]
pub struct ShuffleReport {
    pub input_records: u64,
    pub output_records: u64,
    pub bucket_count: usize,
    /// Records per bucket after partitioning, by bucket index.
    pub bucket_sizes: Vec<u64>,
    /// Most records held in memory at once.
    pub peak_bucket_records: u64,
    /// Most bytes buffered across all buckets while partitioning.
    pub peak_partition_buffer_bytes: usize,
    /// Seed of the job's random source. Passing it back in reproduces the
    /// same output.
    pub seed: u64,
    pub working_dir: PathBuf,
    /// Non-fatal problems removing temporary files.
    pub cleanup_errors: Vec<ShuffleError>,
    pub elapsed: Duration,
}

/// What the two phases produced, before cleanup.
struct PhaseOutcome {
    bucket_sizes: Vec<u64>,
    output_records: u64,
    peak_bucket_records: u64,
    peak_partition_buffer_bytes: usize,
}

/// One run of the two-phase shuffle.
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use shuffle_core::config::ShuffleConfig;
/// use shuffle_core::shuffle::ShuffleJob;
/// use shuffle_core::storage::LocalStorage;
///
/// let config = ShuffleConfig::default();
/// let storage = Arc::new(LocalStorage::new(&config.storage).unwrap());
/// let mut job = ShuffleJob::new(storage, config);
/// let report = job.run(Path::new("train.rec"), Path::new("train.shuffled.rec")).unwrap();
/// println!("shuffled {} records with seed {}", report.output_records, report.seed);
/// ```
pub struct ShuffleJob {
    storage: Arc<dyn StorageBackend>,
    config: ShuffleConfig,
    observer: Box<dyn ShuffleObserver>,
    state: JobState,
    cleanup_errors: Vec<ShuffleError>,
}

impl ShuffleJob {
    pub fn new(storage: Arc<dyn StorageBackend>, config: ShuffleConfig) -> Self {
        let observer = LoggingObserver::new(config.shuffle.progress_interval);
        Self {
            storage,
            config,
            observer: Box::new(observer),
            state: JobState::Created,
            cleanup_errors: Vec::new(),
        }
    }

    /// Replaces the default logging observer.
    pub fn with_observer(mut self, observer: Box<dyn ShuffleObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Cleanup problems of a failed run. A successful run reports them in
    /// its `ShuffleReport` instead.
    pub fn cleanup_errors(&self) -> &[ShuffleError] {
        &self.cleanup_errors
    }

    /// Shuffles `input` into `output` using the configured bucket size.
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<ShuffleReport> {
        let hint = self.config.shuffle.bucket_size;
        self.run_with_bucket_size(input, output, hint)
    }

    /// Shuffles `input` into `output` with buckets of about `bucket_size`
    /// records.
    ///
    /// # Errors
    ///
    /// - `Config` if the job already ran, the settings are invalid,
    ///   `input` and `output` name the same file, or `output` is a directory
    /// - `InputNotFound` if `input` does not exist
    /// - `Format` if `input` is malformed
    /// - `Storage` on any I/O failure
    pub fn run_with_bucket_size(
        &mut self,
        input: &Path,
        output: &Path,
        bucket_size: u64,
    ) -> Result<ShuffleReport> {
        if self.state != JobState::Created {
            return Err(ShuffleError::config(format!(
                "a shuffle job runs once; this one is {}",
                self.state
            )));
        }

        let started = Instant::now();
        match self.execute(input, output, bucket_size) {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                self.state = JobState::Done;
                tracing::info!(
                    records = report.output_records,
                    buckets = report.bucket_count,
                    peak_bucket_records = report.peak_bucket_records,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Shuffle complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Shuffle failed while {}: {}", self.state, e);
                self.state = JobState::Failed;
                Err(e)
            }
        }
    }

    fn execute(&mut self, input: &Path, output: &Path, bucket_size: u64) -> Result<ShuffleReport> {
        self.config.validate()?;
        self.check_output(input, output)?;

        let records = &self.config.records;
        let layout = records.layout()?;
        let output_options = WriterOptions {
            compression: records.compression()?,
            compression_level: records.compression_level,
            block_size: records.block_size,
            write_buffer_size: None,
        };
        // Block buffers are already bounded by the partition budget; a
        // storage buffer per bucket would not be.
        let bucket_options = WriterOptions {
            block_size: records.bucket_block_size,
            write_buffer_size: Some(0),
            ..output_options
        };

        let source = open_source(self.storage.as_ref(), input, layout)?;
        let total = source.record_count();
        let buckets = bucket_count(total, bucket_size)?;
        let (mut rng, seed) = seeded_rng(self.config.shuffle.seed);

        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            records = total,
            buckets,
            seed,
            "Starting shuffle"
        );

        let parent = self.working_parent(output);
        let mut workspace =
            BucketWorkspace::create(Arc::clone(&self.storage), &parent, buckets, bucket_options)?;
        let working_dir = workspace.dir().to_path_buf();

        let mut output_created = false;
        let outcome = self.shuffle_phases(
            source,
            &mut workspace,
            output,
            output_options,
            &mut rng,
            &mut output_created,
        );

        let mut cleanup_errors = workspace.cleanup();
        for error in &cleanup_errors {
            tracing::warn!("{}", error);
        }

        match outcome {
            Ok(phases) => Ok(ShuffleReport {
                input_records: total,
                output_records: phases.output_records,
                bucket_count: buckets,
                bucket_sizes: phases.bucket_sizes,
                peak_bucket_records: phases.peak_bucket_records,
                peak_partition_buffer_bytes: phases.peak_partition_buffer_bytes,
                seed,
                working_dir,
                cleanup_errors,
                elapsed: Duration::ZERO,
            }),
            Err(e) => {
                if output_created {
                    if let Err(remove_error) = self.storage.delete(output) {
                        let error = ShuffleError::cleanup(output, remove_error);
                        tracing::warn!("{}", error);
                        cleanup_errors.push(error);
                    }
                }
                self.cleanup_errors = cleanup_errors;
                Err(e)
            }
        }
    }

    /// Partitions, drains every bucket into a fresh output and finishes it.
    fn shuffle_phases(
        &mut self,
        mut source: Box<dyn RecordSource>,
        workspace: &mut BucketWorkspace,
        output: &Path,
        options: WriterOptions,
        rng: &mut ShuffleRng,
        output_created: &mut bool,
    ) -> Result<PhaseOutcome> {
        let layout = self.config.records.layout()?;
        let mut sink = create_sink(self.storage.as_ref(), output, layout, options)?;
        *output_created = true;

        self.state = JobState::Partitioning;
        let expected = source.record_count();
        let input = source.path().to_path_buf();
        let summary = partition_with_budget(
            source.as_mut(),
            workspace.buckets_mut(),
            &mut *rng,
            self.observer.as_mut(),
            self.config.records.partition_buffer_size,
        )?;
        drop(source);

        let assigned: u64 = summary.counts.iter().sum();
        if summary.total != expected || assigned != expected {
            return Err(ShuffleError::format(
                input,
                format!(
                    "input announced {expected} records but {} were read and {assigned} assigned",
                    summary.total
                ),
            ));
        }

        let mut shuffler = BucketShuffler::new();
        let total_buckets = workspace.len();
        for index in 0..total_buckets {
            self.state = JobState::ShufflingBucket(index);

            let mut bucket = workspace.reopen(index)?;
            let written = shuffler.shuffle_into(&mut bucket, sink.as_mut(), &mut *rng)?;
            drop(bucket);

            // A bucket that cannot be deleted now is retried by the final cleanup.
            if let Err(e) = workspace.delete(index) {
                tracing::warn!("Failed to delete drained bucket {}: {}", index, e);
            }
            self.observer.bucket_shuffled(index, written, total_buckets);
        }

        self.state = JobState::Finalizing;
        let output_records = sink.finish()?;
        if output_records != expected {
            return Err(ShuffleError::format(
                output,
                format!("wrote {output_records} records, expected {expected}"),
            ));
        }

        Ok(PhaseOutcome {
            bucket_sizes: summary.counts,
            output_records,
            peak_bucket_records: shuffler.peak_records(),
            peak_partition_buffer_bytes: summary.peak_buffered_bytes,
        })
    }

    /// Rejects an output that would overwrite the input or cannot be a file.
    /// Paths are compared after resolution, so `data.rec` and `./data.rec`
    /// are the same file.
    fn check_output(&self, input: &Path, output: &Path) -> Result<()> {
        let input_path = self.storage.canonical_path(input)?;
        let output_path = self.storage.canonical_path(output)?;
        if input_path == output_path {
            return Err(ShuffleError::config(format!(
                "input and output are the same file: {}",
                output_path.display()
            )));
        }

        if self.storage.exists(output)? && self.storage.metadata(output)?.is_dir {
            return Err(ShuffleError::config(format!(
                "output is a directory: {}",
                output.display()
            )));
        }
        Ok(())
    }

    fn working_parent(&self, output: &Path) -> PathBuf {
        match &self.config.shuffle.working_dir {
            Some(dir) => dir.clone(),
            None => output.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }
}
