// shuffle-core/src/records/writer.rs

//! Streaming writer for framed record files.

use std::hash::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use crate::error::{Result, ShuffleError};
use crate::storage::{StorageBackend, StorageWriter};

use super::format::{
    compress_block, new_hasher, BlockHeader, CompressionType, FileHeader, FileTrailer,
};
use super::traits::{Record, RecordSink};

/// Options for a framed record writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub compression: CompressionType,
    pub compression_level: i32,
    /// Uncompressed bytes buffered before a block is flushed.
    pub block_size: usize,
    /// Size of the storage-level write buffer below the block buffer.
    /// `None` uses the backend's default; `Some(0)` writes blocks straight
    /// through.
    pub write_buffer_size: Option<usize>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: CompressionType::Lz4,
            compression_level: 3,
            block_size: 1024 * 1024,
            write_buffer_size: None,
        }
    }
}

/// Appends records to a framed file one block at a time.
///
/// Nothing reaches the underlying writer until the first block fills up or
/// `finish` is called; the header is written together with the first block.
/// Memory use is bounded by `block_size` plus one record.
pub struct RecordFileWriter {
    writer: Box<dyn StorageWriter>,
    path: PathBuf,
    options: WriterOptions,
    hasher: XxHash64,
    block: Vec<u8>,
    block_records: u32,
    record_count: u64,
    block_count: u64,
    payload_bytes: u64,
    header_written: bool,
}

impl RecordFileWriter {
    /// Creates (or truncates) the file at `path`.
    pub fn create(
        storage: &dyn StorageBackend,
        path: &Path,
        options: WriterOptions,
    ) -> Result<Self> {
        let writer = match options.write_buffer_size {
            Some(size) => storage.open_write_buffered(path, size)?,
            None => storage.open_write(path)?,
        };

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            options,
            hasher: new_hasher(),
            block: Vec::new(),
            block_records: 0,
            record_count: 0,
            block_count: 0,
            payload_bytes: 0,
            header_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let len = u32::try_from(record.len()).map_err(|_| {
            ShuffleError::format(
                &self.path,
                format!("record of {} bytes exceeds the 4 GiB limit", record.len()),
            )
        })?;

        self.block.extend_from_slice(&len.to_le_bytes());
        self.block.extend_from_slice(record.as_bytes());
        self.block_records += 1;
        self.record_count += 1;
        self.payload_bytes += record.len() as u64;

        if self.block.len() >= self.options.block_size || self.block_records == u32::MAX {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Flushes the last block, writes the trailer and syncs the file.
    pub fn finish(mut self) -> Result<FileTrailer> {
        self.flush_block()?;
        self.ensure_header_written()?;

        let trailer = FileTrailer {
            record_count: self.record_count,
            block_count: self.block_count,
            payload_bytes: self.payload_bytes,
            checksum: self.hasher.finish(),
        };
        let trailer_bytes = trailer.to_bytes(&self.path)?;
        let trailer_len = trailer_bytes.len() as u32;

        self.write_all(&trailer_bytes)?;
        self.write_all(&trailer_len.to_le_bytes())?;
        self.writer.finish()?;

        Ok(trailer)
    }

    /// Bytes of memory held for the pending block.
    pub fn buffered_bytes(&self) -> usize {
        self.block.capacity()
    }

    /// Writes out the pending block, even if it is not full, and releases
    /// the memory behind it.
    pub fn flush_buffer(&mut self) -> Result<()> {
        self.flush_block()?;
        self.block = Vec::new();
        Ok(())
    }

    fn ensure_header_written(&mut self) -> Result<()> {
        if !self.header_written {
            let header = FileHeader::new(self.options.compression);
            self.write_all(&header.to_bytes())?;
            self.header_written = true;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_records == 0 {
            return Ok(());
        }
        self.ensure_header_written()?;

        let stored = compress_block(
            &self.block,
            self.options.compression,
            self.options.compression_level,
            &self.path,
        )?;
        let header = BlockHeader {
            raw_len: self.block_len()?,
            stored_len: u32::try_from(stored.len())
                .map_err(|_| ShuffleError::format(&self.path, "compressed block exceeds 4 GiB"))?,
            record_count: self.block_records,
        };

        self.hasher.write(&self.block);
        self.write_all(&header.to_bytes())?;
        self.write_all(&stored)?;

        self.block.clear();
        self.block_records = 0;
        self.block_count += 1;
        Ok(())
    }

    fn block_len(&self) -> Result<u32> {
        u32::try_from(self.block.len())
            .map_err(|_| ShuffleError::format(&self.path, "block exceeds 4 GiB"))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to write record file", e))
    }
}

impl RecordSink for RecordFileWriter {
    fn append(&mut self, record: &Record) -> Result<()> {
        self.write_record(record)
    }

    fn records_written(&self) -> u64 {
        self.record_count
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        RecordFileWriter::finish(*self).map(|trailer| trailer.record_count)
    }

    fn buffered_bytes(&self) -> usize {
        RecordFileWriter::buffered_bytes(self)
    }

    fn flush_buffer(&mut self) -> Result<()> {
        RecordFileWriter::flush_buffer(self)
    }
}
