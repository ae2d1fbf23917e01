// shuffle-core/src/records/traits.rs

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ShuffleError};

/// One opaque unit of a dataset.
///
/// The shuffle never looks inside a record; it only moves the bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record(Vec<u8>);

impl Record {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if text.len() <= 64 => write!(f, "Record({text:?})"),
            _ => write!(f, "Record({} bytes)", self.0.len()),
        }
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Record {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// A forward-only stream of records with a known total.
pub trait RecordSource: Send {
    /// Number of records the stream holds, known before iteration starts.
    fn record_count(&self) -> u64;

    /// Next record in storage order, or `None` once the stream is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Location of the stream, for logging and error context.
    fn path(&self) -> &Path;
}

/// An append-only record stream.
pub trait RecordSink: Send {
    /// Appends one record at the end of the stream.
    fn append(&mut self, record: &Record) -> Result<()>;

    /// Records appended so far.
    fn records_written(&self) -> u64;

    /// Completes the stream and returns the final record count. Until this
    /// returns `Ok`, the stream is not a valid artifact.
    fn finish(self: Box<Self>) -> Result<u64>;

    /// Bytes of memory currently held for records not yet handed to storage.
    fn buffered_bytes(&self) -> usize {
        0
    }

    /// Hands buffered records to storage and releases the buffer. The
    /// stream stays open for further appends.
    fn flush_buffer(&mut self) -> Result<()> {
        Ok(())
    }
}

/// On-disk layout of a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// Blocked, checksummed format with the record count in a trailer.
    Framed,
    /// One record per line; the newline is not part of the record.
    NewlineDelimited,
    /// Each record preceded by its length as a 4-byte big-endian integer.
    LengthPrefixed,
    /// Records of exactly this many bytes, back to back.
    FixedSize(usize),
}

impl RecordLayout {
    /// Whether `record_count` is known without scanning the file.
    pub fn has_stored_count(&self) -> bool {
        matches!(self, Self::Framed | Self::FixedSize(_))
    }
}

impl FromStr for RecordLayout {
    type Err = ShuffleError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(size_str) = s.strip_prefix("fixed:") {
            let size: usize = size_str.parse().map_err(|_| {
                ShuffleError::config(format!("invalid fixed record size: {size_str}"))
            })?;
            if size == 0 {
                return Err(ShuffleError::config("fixed record size must be greater than 0"));
            }
            return Ok(Self::FixedSize(size));
        }

        match s {
            "framed" => Ok(Self::Framed),
            "newline" | "newline-delimited" => Ok(Self::NewlineDelimited),
            "length-prefixed" => Ok(Self::LengthPrefixed),
            _ => Err(ShuffleError::config(format!(
                "unknown record layout: {s}. Expected 'framed', 'newline', 'length-prefixed', or 'fixed:N'"
            ))),
        }
    }
}

impl fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framed => write!(f, "framed"),
            Self::NewlineDelimited => write!(f, "newline"),
            Self::LengthPrefixed => write!(f, "length-prefixed"),
            Self::FixedSize(size) => write!(f, "fixed:{size}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let record = Record::from("abc");
        assert_eq!(record.as_bytes(), b"abc");
        assert_eq!(record.len(), 3);
        assert!(!record.is_empty());
        assert_eq!(record.clone().into_bytes(), b"abc".to_vec());
        assert!(Record::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_record_debug_is_compact() {
        assert_eq!(format!("{:?}", Record::from("hi")), "Record(\"hi\")");
        assert_eq!(format!("{:?}", Record::new(vec![0xff; 100])), "Record(100 bytes)");
    }

    #[test]
    fn test_parse_layout() {
        assert_eq!("framed".parse::<RecordLayout>().unwrap(), RecordLayout::Framed);
        assert_eq!(
            "newline".parse::<RecordLayout>().unwrap(),
            RecordLayout::NewlineDelimited
        );
        assert_eq!(
            "length-prefixed".parse::<RecordLayout>().unwrap(),
            RecordLayout::LengthPrefixed
        );
        assert_eq!(
            "fixed:16".parse::<RecordLayout>().unwrap(),
            RecordLayout::FixedSize(16)
        );

        assert!("fixed:".parse::<RecordLayout>().is_err());
        assert!("fixed:0".parse::<RecordLayout>().is_err());
        assert!("csv".parse::<RecordLayout>().is_err());
    }

    #[test]
    fn test_layout_display_parses_back() {
        for layout in [
            RecordLayout::Framed,
            RecordLayout::NewlineDelimited,
            RecordLayout::LengthPrefixed,
            RecordLayout::FixedSize(8),
        ] {
            assert_eq!(layout.to_string().parse::<RecordLayout>().unwrap(), layout);
        }
    }

    #[test]
    fn test_stored_count() {
        assert!(RecordLayout::Framed.has_stored_count());
        assert!(RecordLayout::FixedSize(4).has_stored_count());
        assert!(!RecordLayout::NewlineDelimited.has_stored_count());
        assert!(!RecordLayout::LengthPrefixed.has_stored_count());
    }
}
