// shuffle-core/src/shuffle/partitioner.rs

//! First phase: scatter the input across buckets.

use rand::Rng;

use crate::error::{Result, ShuffleError};
use crate::records::{RecordSink, RecordSource};

use super::progress::ShuffleObserver;

/// Outcome of a partitioning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    /// Records appended to each bucket, by bucket index.
    pub counts: Vec<u64>,
    /// Records read from the source.
    pub total: u64,
    /// Most bytes held in bucket buffers at any one time.
    pub peak_buffered_bytes: usize,
}

impl PartitionSummary {
    /// Size of the largest bucket.
    pub fn largest(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Reads `source` to exhaustion, appending each record to a bucket chosen
/// uniformly at random.
///
/// Assignments are independent, so bucket sizes follow a multinomial
/// distribution around `total / buckets.len()`. The first error from the
/// source or a bucket is returned as is; buckets are left for the caller to
/// clean up.
pub fn partition<S, R>(
    source: &mut dyn RecordSource,
    buckets: &mut [S],
    rng: &mut R,
    observer: &mut dyn ShuffleObserver,
) -> Result<PartitionSummary>
where
    S: RecordSink,
    R: Rng + ?Sized,
{
    partition_with_budget(source, buckets, rng, observer, usize::MAX)
}

/// Like [`partition`], but keeps the bytes buffered across all buckets near
/// `buffer_limit`.
///
/// Whenever the buckets together hold more than `buffer_limit` bytes, every
/// bucket flushes its buffer to storage. The overshoot is at most the growth
/// of one bucket buffer on a single append, so memory does not scale with
/// the number of buckets.
pub fn partition_with_budget<S, R>(
    source: &mut dyn RecordSource,
    buckets: &mut [S],
    rng: &mut R,
    observer: &mut dyn ShuffleObserver,
    buffer_limit: usize,
) -> Result<PartitionSummary>
where
    S: RecordSink,
    R: Rng + ?Sized,
{
    if buckets.is_empty() {
        return Err(ShuffleError::config("cannot partition into zero buckets"));
    }

    let expected = source.record_count();
    let mut counts = vec![0u64; buckets.len()];
    let mut total = 0u64;
    let mut buffered: usize = buckets.iter().map(RecordSink::buffered_bytes).sum();
    let mut peak_buffered_bytes = buffered;

    while let Some(record) = source.next_record()? {
        let index = rng.gen_range(0..buckets.len());
        let bucket = &mut buckets[index];

        let before = bucket.buffered_bytes();
        bucket.append(&record)?;
        buffered = buffered - before + bucket.buffered_bytes();
        peak_buffered_bytes = peak_buffered_bytes.max(buffered);

        if buffered > buffer_limit {
            for bucket in buckets.iter_mut() {
                bucket.flush_buffer()?;
            }
            buffered = buckets.iter().map(RecordSink::buffered_bytes).sum();
        }

        counts[index] += 1;
        total += 1;
        observer.record_partitioned(total, expected);
    }

    observer.partitioning_finished(&counts);
    Ok(PartitionSummary {
        counts,
        total,
        peak_buffered_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MemorySink, MemorySource, Record};
    use crate::shuffle::progress::NoopObserver;
    use crate::config::StorageConfig;
    use crate::records::WriterOptions;
    use crate::shuffle::rng::seeded_rng;
    use crate::shuffle::workspace::BucketWorkspace;
    use crate::storage::{LocalStorage, StorageBackend};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn numbered(n: usize) -> MemorySource {
        (0..n).map(|i| Record::from(format!("{i}").as_str())).collect()
    }

    #[test]
    fn test_every_record_lands_in_exactly_one_bucket() {
        let mut source = numbered(1_000);
        let mut buckets = vec![MemorySink::new(); 7];
        let (mut rng, _) = seeded_rng(Some(1));

        let summary = partition(&mut source, &mut buckets, &mut rng, &mut NoopObserver).unwrap();

        assert_eq!(summary.total, 1_000);
        assert_eq!(summary.counts.iter().sum::<u64>(), 1_000);
        for (count, bucket) in summary.counts.iter().zip(&buckets) {
            assert_eq!(*count, bucket.records_written());
        }

        let seen: HashSet<Record> = buckets
            .iter()
            .flat_map(|b| b.records().iter().cloned())
            .collect();
        assert_eq!(seen.len(), 1_000);
    }

    #[test]
    fn test_bucket_order_follows_input_order() {
        let mut source = numbered(200);
        let mut buckets = vec![MemorySink::new(); 3];
        let (mut rng, _) = seeded_rng(Some(9));

        partition(&mut source, &mut buckets, &mut rng, &mut NoopObserver).unwrap();

        for bucket in &buckets {
            let ids: Vec<u32> = bucket
                .records()
                .iter()
                .map(|r| std::str::from_utf8(r.as_bytes()).unwrap().parse().unwrap())
                .collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_assignment_is_roughly_uniform() {
        let mut source = numbered(40_000);
        let mut buckets = vec![MemorySink::new(); 4];
        let (mut rng, _) = seeded_rng(Some(7));

        let summary = partition(&mut source, &mut buckets, &mut rng, &mut NoopObserver).unwrap();

        // Expected 10_000 each, standard deviation about 87.
        for count in &summary.counts {
            assert!((9_500..=10_500).contains(count), "count {count}");
        }
    }

    #[test]
    fn test_zero_buckets_is_config_error() {
        let mut source = numbered(3);
        let mut buckets: Vec<MemorySink> = Vec::new();
        let (mut rng, _) = seeded_rng(Some(1));

        let result = partition(&mut source, &mut buckets, &mut rng, &mut NoopObserver);
        assert!(matches!(result, Err(ShuffleError::Config { .. })));
    }

    #[test]
    fn test_empty_source() {
        let mut source = numbered(0);
        let mut buckets = vec![MemorySink::new()];
        let (mut rng, _) = seeded_rng(Some(1));

        let summary = partition(&mut source, &mut buckets, &mut rng, &mut NoopObserver).unwrap();
        assert_eq!(
            summary,
            PartitionSummary {
                counts: vec![0],
                total: 0,
                peak_buffered_bytes: 0,
            }
        );
        assert_eq!(summary.largest(), 0);
    }

    struct CountingObserver {
        calls: u64,
        finished: Option<Vec<u64>>,
    }

    impl ShuffleObserver for CountingObserver {
        fn record_partitioned(&mut self, done: u64, total: u64) {
            self.calls += 1;
            assert_eq!(done, self.calls);
            assert_eq!(total, 50);
        }

        fn partitioning_finished(&mut self, counts: &[u64]) {
            self.finished = Some(counts.to_vec());
        }
    }

    #[test]
    fn test_observer_sees_every_record() {
        let mut source = numbered(50);
        let mut buckets = vec![MemorySink::new(); 2];
        let (mut rng, _) = seeded_rng(Some(3));
        let mut observer = CountingObserver {
            calls: 0,
            finished: None,
        };

        let summary = partition(&mut source, &mut buckets, &mut rng, &mut observer).unwrap();
        assert_eq!(observer.calls, 50);
        assert_eq!(observer.finished, Some(summary.counts));
    }

    fn fixed_width(n: usize) -> MemorySource {
        (0..n)
            .map(|i| Record::from(format!("record-{i:09}").as_str()))
            .collect()
    }

    fn peak_for(records: usize, bucket_hint: usize, budget: usize) -> usize {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp.path().to_path_buf(),
            ..Default::default()
        };
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config).unwrap());
        let options = WriterOptions {
            block_size: BLOCK_SIZE,
            write_buffer_size: Some(0),
            ..Default::default()
        };
        let count = records.div_ceil(bucket_hint);
        let mut workspace =
            BucketWorkspace::create(Arc::clone(&storage), Path::new("."), count, options).unwrap();
        let mut source = fixed_width(records);
        let (mut rng, _) = seeded_rng(Some(11));

        let summary = partition_with_budget(
            &mut source,
            workspace.buckets_mut(),
            &mut rng,
            &mut NoopObserver,
            budget,
        )
        .unwrap();
        assert_eq!(summary.total, records as u64);

        // Flushed partial blocks still read back completely.
        let mut read = 0u64;
        for index in 0..workspace.len() {
            read += workspace.reopen(index).unwrap().count() as u64;
        }
        assert_eq!(read, records as u64);
        assert!(workspace.cleanup().is_empty());

        summary.peak_buffered_bytes
    }

    const BLOCK_SIZE: usize = 4096;

    #[test]
    fn test_buffered_bytes_stay_bounded_as_input_grows() {
        let hint = 100;
        let budget = 16 * 1024;
        // One append grows a single buffer by at most its block plus a record.
        let bound = budget + 2 * (BLOCK_SIZE + 32);

        let small = peak_for(10 * hint, hint, budget);
        let large = peak_for(100 * hint, hint, budget);

        assert!(small <= bound, "peak {small} exceeds {bound}");
        assert!(large <= bound, "peak {large} exceeds {bound}");

        // Without a budget, 100 buckets hold far more than that.
        let unbounded = peak_for(100 * hint, hint, usize::MAX);
        assert!(unbounded > bound, "unbudgeted peak {unbounded}");
    }
}
