// shuffle-core/src/records/memory.rs

//! In-memory record streams.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::traits::{Record, RecordSink, RecordSource};

/// A `RecordSource` over records already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    records: VecDeque<Record>,
    total: u64,
    path: PathBuf,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        let total = records.len() as u64;
        Self {
            records: records.into(),
            total,
            path: PathBuf::from("<memory>"),
        }
    }

    /// Sets the name reported by `path()`.
    pub fn with_name(mut self, name: impl Into<PathBuf>) -> Self {
        self.path = name.into();
        self
    }
}

impl FromIterator<Record> for MemorySource {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl RecordSource for MemorySource {
    fn record_count(&self) -> u64 {
        self.total
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.pop_front())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// A `RecordSink` that keeps everything it is given.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<Record>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.records.len() as u64
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_yields_in_order() {
        let mut source: MemorySource = ["a", "b", "c"].into_iter().map(Record::from).collect();
        assert_eq!(source.record_count(), 3);
        assert_eq!(source.next_record().unwrap(), Some(Record::from("a")));
        assert_eq!(source.next_record().unwrap(), Some(Record::from("b")));
        assert_eq!(source.next_record().unwrap(), Some(Record::from("c")));
        assert_eq!(source.next_record().unwrap(), None);
        // Count is the total, not what remains.
        assert_eq!(source.record_count(), 3);
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        sink.append(&Record::from("x")).unwrap();
        sink.append(&Record::from("y")).unwrap();
        assert_eq!(sink.records_written(), 2);
        assert_eq!(sink.records(), &[Record::from("x"), Record::from("y")]);
    }
}
