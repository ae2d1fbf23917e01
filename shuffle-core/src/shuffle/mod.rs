// shuffle-core/src/shuffle/mod.rs

//! Two-phase external shuffle.
//!
//! [`partition`] scatters the input across buckets, [`BucketShuffler`]
//! permutes one bucket at a time, and [`ShuffleJob`] ties both phases
//! together with the bucket lifecycle and cleanup.

mod bucket;
mod orchestrator;
mod partitioner;
mod progress;
mod rng;
mod workspace;

pub use bucket::BucketShuffler;
pub use orchestrator::{bucket_count, JobState, ShuffleJob, ShuffleReport};
pub use partitioner::{partition, partition_with_budget, PartitionSummary};
pub use progress::{LoggingObserver, NoopObserver, ShuffleObserver};
pub use rng::{seeded_rng, ShuffleRng};
pub use workspace::{bucket_file_name, Bucket, BucketWorkspace};
