// shuffle-core/src/shuffle/progress.rs

//! Progress notifications for a running shuffle.

/// Receives progress from both phases of a shuffle job.
///
/// All methods have empty defaults. Callbacks run on the job's thread and
/// should return quickly.
pub trait ShuffleObserver: Send {
    /// A record was assigned to a bucket. `done` counts from 1.
    fn record_partitioned(&mut self, _done: u64, _total: u64) {}

    /// The input is exhausted. `counts[i]` is the size of bucket `i`.
    fn partitioning_finished(&mut self, _counts: &[u64]) {}

    /// Bucket `index` was shuffled into the output.
    fn bucket_shuffled(&mut self, _index: usize, _records: u64, _total_buckets: usize) {}
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ShuffleObserver for NoopObserver {}

/// Logs progress through `tracing`.
///
/// Partitioning is logged every `interval` records and at the end; every
/// bucket is logged at debug level.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    interval: u64,
}

impl LoggingObserver {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl ShuffleObserver for LoggingObserver {
    fn record_partitioned(&mut self, done: u64, total: u64) {
        if done % self.interval == 0 || done == total {
            let percent = if total == 0 {
                100.0
            } else {
                done as f64 * 100.0 / total as f64
            };
            tracing::info!("Partitioned {}/{} records ({:.1}%)", done, total, percent);
        }
    }

    fn partitioning_finished(&mut self, counts: &[u64]) {
        let largest = counts.iter().copied().max().unwrap_or(0);
        tracing::info!(
            buckets = counts.len(),
            largest_bucket = largest,
            "Partitioning finished"
        );
    }

    fn bucket_shuffled(&mut self, index: usize, records: u64, total_buckets: usize) {
        tracing::debug!(
            "Shuffled bucket {}/{} ({} records)",
            index + 1,
            total_buckets,
            records
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_observer_interval_floor() {
        let observer = LoggingObserver::new(0);
        assert_eq!(observer.interval, 1);
    }

    #[test]
    fn test_default_methods_are_callable() {
        let mut observer = NoopObserver;
        observer.record_partitioned(1, 1);
        observer.partitioning_finished(&[1]);
        observer.bucket_shuffled(0, 1, 1);

        let mut logging = LoggingObserver::default();
        logging.record_partitioned(100_000, 200_000);
        logging.partitioning_finished(&[]);
    }
}
