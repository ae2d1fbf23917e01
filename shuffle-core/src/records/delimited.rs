// shuffle-core/src/records/delimited.rs

//! Readers and writers for raw record files without a trailer.
//!
//! Newline-delimited and length-prefixed files do not store their record
//! count, so opening one costs a counting pass over the file. Fixed-size
//! files are counted from their length.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, ShuffleError};
use crate::storage::{StorageBackend, StorageReader, StorageWriter};

use super::traits::{Record, RecordLayout, RecordSink, RecordSource};

const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Reads newline-delimited, length-prefixed or fixed-size records.
pub struct DelimitedReader {
    reader: BufReader<Box<dyn StorageReader>>,
    path: PathBuf,
    layout: RecordLayout,
    record_count: u64,
    records_read: u64,
    line: Vec<u8>,
}

impl DelimitedReader {
    /// Opens `path` and counts its records.
    ///
    /// # Errors
    ///
    /// `InputNotFound` if the file is absent, `Format` if the layout is
    /// `Framed` or the file does not split cleanly into records.
    pub fn open(storage: &dyn StorageBackend, path: &Path, layout: RecordLayout) -> Result<Self> {
        if layout == RecordLayout::Framed {
            return Err(ShuffleError::format(path, "framed files need RecordFileReader"));
        }
        if !storage.exists(path)? {
            return Err(ShuffleError::input_not_found(path));
        }

        let record_count = count_records(storage, path, layout)?;
        let reader = storage.open_read(path)?;

        Ok(Self {
            reader: BufReader::with_capacity(SCAN_BUFFER_SIZE, reader),
            path: path.to_path_buf(),
            layout,
            record_count,
            records_read: 0,
            line: Vec::new(),
        })
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Reads the next record, or `None` at the end of the file.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let record = match self.layout {
            RecordLayout::NewlineDelimited => self.read_line()?,
            RecordLayout::LengthPrefixed => self.read_prefixed()?,
            RecordLayout::FixedSize(size) => self.read_fixed(size)?,
            RecordLayout::Framed => None,
        };

        match record {
            Some(record) => {
                self.records_read += 1;
                Ok(Some(record))
            }
            None if self.records_read != self.record_count => Err(ShuffleError::format(
                &self.path,
                format!(
                    "file changed while reading: counted {} records, read {}",
                    self.record_count, self.records_read
                ),
            )),
            None => Ok(None),
        }
    }

    fn read_line(&mut self) -> Result<Option<Record>> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to read line", e))?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        Ok(Some(Record::new(self.line.as_slice())))
    }

    fn read_prefixed(&mut self) -> Result<Option<Record>> {
        let mut prefix = [0u8; 4];
        if !read_exact_or_eof(&mut self.reader, &mut prefix, &self.path)? {
            return Ok(None);
        }
        let len = u32::from_be_bytes(prefix) as usize;

        let mut payload = vec![0u8; len];
        if !read_exact_or_eof(&mut self.reader, &mut payload, &self.path)? && len > 0 {
            return Err(ShuffleError::format(&self.path, "record payload truncated"));
        }
        Ok(Some(Record::new(payload)))
    }

    fn read_fixed(&mut self, size: usize) -> Result<Option<Record>> {
        let mut payload = vec![0u8; size];
        if !read_exact_or_eof(&mut self.reader, &mut payload, &self.path)? {
            return Ok(None);
        }
        Ok(Some(Record::new(payload)))
    }
}

impl RecordSource for DelimitedReader {
    fn record_count(&self) -> u64 {
        self.record_count
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        self.read_record()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for DelimitedReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Fills `buf` completely. Returns `false` on a clean end of file before the
/// first byte, and a `Format` error if the file ends part way through.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8], path: &Path) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ShuffleError::storage_with_source(path, "failed to read record", e)),
        }
    }

    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(ShuffleError::format(
            path,
            format!("file ends inside a record ({n} of {} bytes)", buf.len()),
        )),
    }
}

/// Counts records without keeping them.
fn count_records(storage: &dyn StorageBackend, path: &Path, layout: RecordLayout) -> Result<u64> {
    let mut reader = storage.open_read(path)?;
    let size = reader.size();

    match layout {
        RecordLayout::FixedSize(record_size) => {
            if size % record_size as u64 != 0 {
                return Err(ShuffleError::format(
                    path,
                    format!("file size {size} is not a multiple of record size {record_size}"),
                ));
            }
            Ok(size / record_size as u64)
        }
        RecordLayout::NewlineDelimited => {
            let mut buf = vec![0u8; SCAN_BUFFER_SIZE];
            let mut count = 0u64;
            let mut last = None;
            loop {
                let n = reader.read(&mut buf).map_err(|e| {
                    ShuffleError::storage_with_source(path, "failed to scan file", e)
                })?;
                if n == 0 {
                    break;
                }
                count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
                last = Some(buf[n - 1]);
            }
            // A final line without a newline is still a record.
            if matches!(last, Some(b) if b != b'\n') {
                count += 1;
            }
            Ok(count)
        }
        RecordLayout::LengthPrefixed => {
            let mut reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, reader);
            let mut prefix = [0u8; 4];
            let mut count = 0u64;
            while read_exact_or_eof(&mut reader, &mut prefix, path)? {
                let len = u64::from(u32::from_be_bytes(prefix));
                let skipped = io::copy(&mut (&mut reader).take(len), &mut io::sink())
                    .map_err(|e| ShuffleError::storage_with_source(path, "failed to scan file", e))?;
                if skipped < len {
                    return Err(ShuffleError::format(path, "record payload truncated"));
                }
                count += 1;
            }
            Ok(count)
        }
        RecordLayout::Framed => Err(ShuffleError::format(path, "framed files store their count")),
    }
}

/// Writes records in a delimited layout.
pub struct DelimitedWriter {
    writer: Box<dyn StorageWriter>,
    path: PathBuf,
    layout: RecordLayout,
    records_written: u64,
}

impl DelimitedWriter {
    pub fn create(storage: &dyn StorageBackend, path: &Path, layout: RecordLayout) -> Result<Self> {
        if layout == RecordLayout::Framed {
            return Err(ShuffleError::format(path, "framed files need RecordFileWriter"));
        }

        Ok(Self {
            writer: storage.open_write(path)?,
            path: path.to_path_buf(),
            layout,
            records_written: 0,
        })
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        match self.layout {
            RecordLayout::NewlineDelimited => {
                if record.as_bytes().contains(&b'\n') {
                    return Err(ShuffleError::format(&self.path, "record contains a newline"));
                }
                self.write_all(record.as_bytes())?;
                self.write_all(b"\n")?;
            }
            RecordLayout::LengthPrefixed => {
                let len = u32::try_from(record.len()).map_err(|_| {
                    ShuffleError::format(&self.path, "record exceeds the 4 GiB limit")
                })?;
                self.write_all(&len.to_be_bytes())?;
                self.write_all(record.as_bytes())?;
            }
            RecordLayout::FixedSize(size) => {
                if record.len() != size {
                    return Err(ShuffleError::format(
                        &self.path,
                        format!("record is {} bytes, layout requires {size}", record.len()),
                    ));
                }
                self.write_all(record.as_bytes())?;
            }
            RecordLayout::Framed => {
                return Err(ShuffleError::format(&self.path, "framed files need RecordFileWriter"));
            }
        }

        self.records_written += 1;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to write record", e))
    }
}

impl RecordSink for DelimitedWriter {
    fn append(&mut self, record: &Record) -> Result<()> {
        self.write_record(record)
    }

    fn records_written(&self) -> u64 {
        self.records_written
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        let count = self.records_written;
        self.writer.finish()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        (LocalStorage::new(&config).unwrap(), temp_dir)
    }

    fn write_raw(storage: &LocalStorage, path: &str, data: &[u8]) {
        let mut writer = storage.open_write(Path::new(path)).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    fn read_all(storage: &LocalStorage, path: &str, layout: RecordLayout) -> Vec<Record> {
        DelimitedReader::open(storage, Path::new(path), layout)
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_newline_records() {
        let (storage, _temp) = create_test_storage();
        write_raw(&storage, "lines.txt", b"alpha\n\nbeta\ngamma");

        let reader =
            DelimitedReader::open(&storage, Path::new("lines.txt"), RecordLayout::NewlineDelimited)
                .unwrap();
        assert_eq!(reader.record_count(), 4);

        let records: Vec<Record> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(
            records,
            vec![
                Record::from("alpha"),
                Record::from(""),
                Record::from("beta"),
                Record::from("gamma"),
            ]
        );
    }

    #[test]
    fn test_empty_file_has_no_records() {
        let (storage, _temp) = create_test_storage();
        write_raw(&storage, "empty.txt", b"");

        for layout in [
            RecordLayout::NewlineDelimited,
            RecordLayout::LengthPrefixed,
            RecordLayout::FixedSize(3),
        ] {
            let reader = DelimitedReader::open(&storage, Path::new("empty.txt"), layout).unwrap();
            assert_eq!(reader.record_count(), 0);
            assert!(read_all(&storage, "empty.txt", layout).is_empty());
        }
    }

    #[test]
    fn test_length_prefixed_records() {
        let (storage, _temp) = create_test_storage();
        let mut data = vec![];
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(b"hello");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(b"bye");
        write_raw(&storage, "prefixed.bin", &data);

        let records = read_all(&storage, "prefixed.bin", RecordLayout::LengthPrefixed);
        assert_eq!(
            records,
            vec![Record::from("hello"), Record::from(""), Record::from("bye")]
        );
    }

    #[test]
    fn test_truncated_length_prefixed_is_format_error() {
        let (storage, _temp) = create_test_storage();
        let mut data = vec![];
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"short");
        write_raw(&storage, "bad.bin", &data);

        let result = DelimitedReader::open(&storage, Path::new("bad.bin"), RecordLayout::LengthPrefixed);
        assert!(matches!(result, Err(ShuffleError::Format { .. })));
    }

    #[test]
    fn test_length_prefixed_count_streams_many_records() {
        let (storage, _temp) = create_test_storage();
        let mut data = vec![];
        for i in 0..10_000u32 {
            let payload = format!("payload-{i}");
            data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            data.extend_from_slice(payload.as_bytes());
        }
        // Zero-length records count too.
        data.extend_from_slice(&0u32.to_be_bytes());
        write_raw(&storage, "many.bin", &data);

        let reader =
            DelimitedReader::open(&storage, Path::new("many.bin"), RecordLayout::LengthPrefixed)
                .unwrap();
        assert_eq!(reader.record_count(), 10_001);
    }

    #[test]
    fn test_partial_length_prefix_is_format_error() {
        let (storage, _temp) = create_test_storage();
        let mut data = vec![];
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(b"abc");
        data.extend_from_slice(&[0, 0]);
        write_raw(&storage, "cut.bin", &data);

        let result = DelimitedReader::open(&storage, Path::new("cut.bin"), RecordLayout::LengthPrefixed);
        assert!(matches!(result, Err(ShuffleError::Format { .. })));
    }

    #[test]
    fn test_fixed_size_records() {
        let (storage, _temp) = create_test_storage();
        write_raw(&storage, "fixed.bin", b"aaabbbccc");

        let records = read_all(&storage, "fixed.bin", RecordLayout::FixedSize(3));
        assert_eq!(records.len(), 3);
        assert_eq!(records[2], Record::from("ccc"));

        let result = DelimitedReader::open(&storage, Path::new("fixed.bin"), RecordLayout::FixedSize(4));
        assert!(matches!(result, Err(ShuffleError::Format { .. })));
    }

    #[test]
    fn test_missing_file() {
        let (storage, _temp) = create_test_storage();
        let result =
            DelimitedReader::open(&storage, Path::new("nope.txt"), RecordLayout::NewlineDelimited);
        assert!(matches!(result, Err(ShuffleError::InputNotFound { .. })));
    }

    #[test]
    fn test_writer_round_trip_per_layout() {
        let (storage, _temp) = create_test_storage();
        let records = vec![Record::from("abcd"), Record::from("efgh"), Record::from("ijkl")];

        for (name, layout) in [
            ("out.txt", RecordLayout::NewlineDelimited),
            ("out.lp", RecordLayout::LengthPrefixed),
            ("out.fix", RecordLayout::FixedSize(4)),
        ] {
            let mut writer: Box<dyn RecordSink> =
                Box::new(DelimitedWriter::create(&storage, Path::new(name), layout).unwrap());
            for record in &records {
                writer.append(record).unwrap();
            }
            assert_eq!(writer.finish().unwrap(), 3);
            assert_eq!(read_all(&storage, name, layout), records, "{layout}");
        }
    }

    #[test]
    fn test_writer_rejects_unrepresentable_records() {
        let (storage, _temp) = create_test_storage();

        let mut lines =
            DelimitedWriter::create(&storage, Path::new("l.txt"), RecordLayout::NewlineDelimited)
                .unwrap();
        assert!(lines.write_record(&Record::from("two\nlines")).is_err());

        let mut fixed =
            DelimitedWriter::create(&storage, Path::new("f.bin"), RecordLayout::FixedSize(2))
                .unwrap();
        assert!(fixed.write_record(&Record::from("abc")).is_err());

        assert!(DelimitedWriter::create(&storage, Path::new("x"), RecordLayout::Framed).is_err());
    }
}
