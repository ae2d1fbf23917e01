// shuffle-core/src/records/reader.rs

//! Streaming reader for framed record files.

use std::hash::Hasher;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use crate::error::{Result, ShuffleError};
use crate::storage::{StorageBackend, StorageReader};

use super::format::{
    decompress_block, new_hasher, BlockHeader, CompressionType, FileHeader, FileTrailer,
    BLOCK_HEADER_SIZE, HEADER_SIZE, RECORD_LEN_SIZE, TRAILER_LEN_SIZE,
};
use super::traits::{Record, RecordSource};

/// Reads a framed record file front to back.
///
/// Opening validates the header and loads the trailer, so `record_count`
/// is available immediately. Only one decompressed block is held in memory.
/// Once the last block has been consumed the record count, block count and
/// checksum are checked against the trailer.
pub struct RecordFileReader {
    reader: Box<dyn StorageReader>,
    path: PathBuf,
    compression: CompressionType,
    trailer: FileTrailer,
    data_end: u64,
    position: u64,
    block: Vec<u8>,
    block_pos: usize,
    block_remaining: u32,
    hasher: XxHash64,
    records_read: u64,
    blocks_read: u64,
    done: bool,
}

impl RecordFileReader {
    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// - `InputNotFound` if nothing exists at `path`
    /// - `Format` if the file is not a finished framed record file
    pub fn open(storage: &dyn StorageBackend, path: &Path) -> Result<Self> {
        if !storage.exists(path)? {
            return Err(ShuffleError::input_not_found(path));
        }

        let mut reader = storage.open_read(path)?;
        let size = reader.size();

        if size < (HEADER_SIZE + TRAILER_LEN_SIZE) as u64 {
            return Err(ShuffleError::format(
                path,
                format!("{size} bytes is too small for a finished record file"),
            ));
        }

        let header_bytes = reader.read_range(0, HEADER_SIZE)?;
        let header = FileHeader::from_bytes(&header_bytes)
            .ok_or_else(|| ShuffleError::format(path, "truncated header"))?;
        if !header.validate_magic() {
            return Err(ShuffleError::format(
                path,
                format!("invalid magic bytes: {:?}", header.magic),
            ));
        }

        let len_bytes = reader.read_range(size - TRAILER_LEN_SIZE as u64, TRAILER_LEN_SIZE)?;
        let trailer_len =
            u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as u64;
        if (HEADER_SIZE + TRAILER_LEN_SIZE) as u64 + trailer_len > size {
            return Err(ShuffleError::format(
                path,
                "missing or truncated trailer; the file was not finished",
            ));
        }

        let data_end = size - TRAILER_LEN_SIZE as u64 - trailer_len;
        let trailer_bytes = reader.read_range(data_end, trailer_len as usize)?;
        let trailer = FileTrailer::from_bytes(&trailer_bytes, path)?;

        reader.seek(SeekFrom::Start(HEADER_SIZE as u64)).map_err(|e| {
            ShuffleError::storage_with_source(path, "failed to seek past header", e)
        })?;

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            compression: header.compression(),
            trailer,
            data_end,
            position: HEADER_SIZE as u64,
            block: Vec::new(),
            block_pos: 0,
            block_remaining: 0,
            hasher: new_hasher(),
            records_read: 0,
            blocks_read: 0,
            done: false,
        })
    }

    pub fn trailer(&self) -> &FileTrailer {
        &self.trailer
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Reads the next record, or `None` at the end of the file.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.block_remaining > 0 {
                let record = self.take_from_block()?;
                self.block_remaining -= 1;
                self.records_read += 1;
                return Ok(Some(record));
            }

            if self.block_pos != self.block.len() {
                return Err(ShuffleError::format(&self.path, "trailing bytes after last record in block"));
            }

            if self.position >= self.data_end {
                self.verify_end()?;
                self.done = true;
                return Ok(None);
            }

            self.load_block()?;
        }
    }

    fn take_from_block(&mut self) -> Result<Record> {
        let start = self.block_pos;
        let len_end = start + RECORD_LEN_SIZE;
        if len_end > self.block.len() {
            return Err(ShuffleError::format(&self.path, "record length prefix crosses block end"));
        }

        let len = u32::from_le_bytes([
            self.block[start],
            self.block[start + 1],
            self.block[start + 2],
            self.block[start + 3],
        ]) as usize;
        let end = len_end + len;
        if end > self.block.len() {
            return Err(ShuffleError::format(&self.path, "record payload crosses block end"));
        }

        self.block_pos = end;
        Ok(Record::new(&self.block[len_end..end]))
    }

    fn load_block(&mut self) -> Result<()> {
        if self.position + BLOCK_HEADER_SIZE as u64 > self.data_end {
            return Err(ShuffleError::format(&self.path, "truncated block header"));
        }

        let mut header_bytes = [0u8; BLOCK_HEADER_SIZE];
        self.read_exact(&mut header_bytes)?;
        let header = BlockHeader::from_bytes(&header_bytes);

        let block_end = self.position + BLOCK_HEADER_SIZE as u64 + header.stored_len as u64;
        if block_end > self.data_end {
            return Err(ShuffleError::format(&self.path, "block runs into the trailer"));
        }

        let mut stored = vec![0u8; header.stored_len as usize];
        self.read_exact(&mut stored)?;

        let raw = decompress_block(&stored, self.compression, header.raw_len as usize, &self.path)?;
        self.hasher.write(&raw);

        self.block = raw;
        self.block_pos = 0;
        self.block_remaining = header.record_count;
        self.blocks_read += 1;
        self.position = block_end;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader
            .read_exact(buf)
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to read block", e))
    }

    fn verify_end(&self) -> Result<()> {
        if self.records_read != self.trailer.record_count {
            return Err(ShuffleError::format(
                &self.path,
                format!(
                    "record count mismatch: trailer says {}, file holds {}",
                    self.trailer.record_count, self.records_read
                ),
            ));
        }
        if self.blocks_read != self.trailer.block_count {
            return Err(ShuffleError::format(
                &self.path,
                format!(
                    "block count mismatch: trailer says {}, file holds {}",
                    self.trailer.block_count, self.blocks_read
                ),
            ));
        }

        let checksum = self.hasher.finish();
        if checksum != self.trailer.checksum {
            return Err(ShuffleError::format(
                &self.path,
                format!(
                    "checksum mismatch: expected {:#x}, got {:#x}",
                    self.trailer.checksum, checksum
                ),
            ));
        }
        Ok(())
    }
}

impl RecordSource for RecordFileReader {
    fn record_count(&self) -> u64 {
        self.trailer.record_count
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        self.read_record()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for RecordFileReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
