// shuffle-core/src/shuffle/bucket.rs

//! Second phase: permute one bucket in memory.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;
use crate::records::{Record, RecordSink, RecordSource};

// Upper bound for the up-front allocation, in case a count is bogus.
const MAX_PREALLOCATED_RECORDS: u64 = 1 << 20;

/// Loads a bucket into memory, permutes it uniformly and appends the result
/// to an output stream.
///
/// Memory use is proportional to the bucket being shuffled; the shuffler
/// keeps track of the largest bucket it has held.
#[derive(Debug, Default)]
pub struct BucketShuffler {
    peak_records: u64,
}

impl BucketShuffler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most records held in memory at once so far.
    pub fn peak_records(&self) -> u64 {
        self.peak_records
    }

    /// Shuffles every record of `source` into `output` and returns how many
    /// were written.
    ///
    /// Uses Fisher-Yates, so each ordering of the bucket is equally likely
    /// given a uniform `rng`. Records are appended to whatever `output`
    /// already holds.
    pub fn shuffle_into<R: Rng + ?Sized>(
        &mut self,
        source: &mut dyn RecordSource,
        output: &mut dyn RecordSink,
        rng: &mut R,
    ) -> Result<u64> {
        let capacity = source.record_count().min(MAX_PREALLOCATED_RECORDS) as usize;
        let mut records: Vec<Record> = Vec::with_capacity(capacity);
        while let Some(record) = source.next_record()? {
            records.push(record);
        }
        self.peak_records = self.peak_records.max(records.len() as u64);

        records.shuffle(rng);

        for record in &records {
            output.append(record)?;
        }
        Ok(records.len() as u64)
    }
}
