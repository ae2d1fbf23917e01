// shuffle-core/src/records/format.rs

//! Framed record file layout.
//!
//! ```text
//! +----------------------------+
//! | Magic "RSF1" (4 bytes)     |
//! +----------------------------+
//! | Flags (4 bytes)            |  <- compression in the low 2 bits
//! +----------------------------+
//! | Reserved (24 bytes)        |
//! +----------------------------+
//! | Block 0 .. Block n-1       |
//! +----------------------------+
//! | Trailer (bincode)          |  <- FileTrailer
//! +----------------------------+
//! | Trailer Length (4 bytes)   |  <- u32 LE
//! +----------------------------+
//! ```
//!
//! Each block is a 12-byte `BlockHeader` (raw length, stored length, record
//! count; all u32 LE) followed by the stored bytes. The raw bytes are a run
//! of `[u32 LE length][payload]` entries. The checksum is XXHash64 over the
//! raw bytes of every block, in file order.
//!
//! The trailer is written last, so a file without one was never finished.

use std::hash::Hasher;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{Result, ShuffleError};

pub const MAGIC: [u8; 4] = *b"RSF1";

pub const HEADER_SIZE: usize = 32;

pub const TRAILER_LEN_SIZE: usize = 4;

pub const BLOCK_HEADER_SIZE: usize = 12;

/// Size of the length prefix in front of every record inside a block.
pub const RECORD_LEN_SIZE: usize = 4;

pub const FLAG_COMPRESSION_NONE: u32 = 0x0000;
pub const FLAG_COMPRESSION_LZ4: u32 = 0x0001;
pub const FLAG_COMPRESSION_ZSTD: u32 = 0x0002;
pub const FLAG_COMPRESSION_MASK: u32 = 0x0003;

/// Fixed-size header at the start of a framed file.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub flags: u32,
    pub reserved: [u8; 24],
}

impl FileHeader {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            magic: MAGIC,
            flags: compression.to_flag(),
            reserved: [0u8; 24],
        }
    }

    pub fn compression(&self) -> CompressionType {
        CompressionType::from_flag(self.flags)
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..32].copy_from_slice(&self.reserved);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let flags = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let mut reserved = [0u8; 24];
        reserved.copy_from_slice(&bytes[8..32]);

        Some(Self {
            magic,
            flags,
            reserved,
        })
    }
}

/// Block compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lz4,
    Zstd,
}

impl CompressionType {
    pub fn to_flag(self) -> u32 {
        match self {
            CompressionType::None => FLAG_COMPRESSION_NONE,
            CompressionType::Lz4 => FLAG_COMPRESSION_LZ4,
            CompressionType::Zstd => FLAG_COMPRESSION_ZSTD,
        }
    }

    pub fn from_flag(flag: u32) -> Self {
        match flag & FLAG_COMPRESSION_MASK {
            FLAG_COMPRESSION_LZ4 => CompressionType::Lz4,
            FLAG_COMPRESSION_ZSTD => CompressionType::Zstd,
            _ => CompressionType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl FromStr for CompressionType {
    type Err = ShuffleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "lz4" => Ok(CompressionType::Lz4),
            "zstd" => Ok(CompressionType::Zstd),
            _ => Err(ShuffleError::config(format!(
                "unknown compression: {s}. Expected 'none', 'lz4', or 'zstd'"
            ))),
        }
    }
}

/// Summary written after the last block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTrailer {
    pub record_count: u64,
    pub block_count: u64,
    /// Sum of record payload sizes, excluding length prefixes.
    pub payload_bytes: u64,
    /// XXHash64 of the raw block bytes.
    pub checksum: u64,
}

impl FileTrailer {
    pub fn to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| ShuffleError::format(path, format!("failed to serialize trailer: {e}")))
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| ShuffleError::format(path, format!("failed to deserialize trailer: {e}")))
    }
}

/// Per-block framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub raw_len: u32,
    pub stored_len: u32,
    pub record_count: u32,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.raw_len.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.stored_len.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.record_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; BLOCK_HEADER_SIZE]) -> Self {
        Self {
            raw_len: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            stored_len: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            record_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

pub(crate) fn new_hasher() -> XxHash64 {
    XxHash64::with_seed(0)
}

pub(crate) fn checksum(data: &[u8]) -> u64 {
    let mut hasher = new_hasher();
    hasher.write(data);
    hasher.finish()
}

pub(crate) fn compress_block(
    data: &[u8],
    compression: CompressionType,
    level: i32,
    path: &Path,
) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4 => Ok(lz4_flex::compress(data)),
        CompressionType::Zstd => zstd::encode_all(data, level.clamp(1, 22))
            .map_err(|e| ShuffleError::storage_with_source(path, "zstd compression failed", e)),
    }
}

pub(crate) fn decompress_block(
    data: &[u8],
    compression: CompressionType,
    raw_len: usize,
    path: &Path,
) -> Result<Vec<u8>> {
    let raw = match compression {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4 => lz4_flex::decompress(data, raw_len)
            .map_err(|e| ShuffleError::format(path, format!("lz4 decompression failed: {e}")))?,
        CompressionType::Zstd => zstd::decode_all(data)
            .map_err(|e| ShuffleError::format(path, format!("zstd decompression failed: {e}")))?,
    };

    if raw.len() != raw_len {
        return Err(ShuffleError::format(
            path,
            format!("block size mismatch: expected {raw_len}, got {}", raw.len()),
        ));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FileHeader::new(CompressionType::Zstd);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], b"RSF1");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), FLAG_COMPRESSION_ZSTD);

        let parsed = FileHeader::from_bytes(&bytes).unwrap();
        assert!(parsed.validate_magic());
        assert_eq!(parsed.compression(), CompressionType::Zstd);
        assert!(FileHeader::from_bytes(&bytes[..10]).is_none());
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = FileHeader::new(CompressionType::None).to_bytes();
        bytes[0] = b'X';
        assert!(!FileHeader::from_bytes(&bytes).unwrap().validate_magic());
    }

    #[test]
    fn test_compression_names() {
        assert_eq!("LZ4".parse::<CompressionType>().unwrap(), CompressionType::Lz4);
        assert_eq!("none".parse::<CompressionType>().unwrap(), CompressionType::None);
        assert!("gzip".parse::<CompressionType>().is_err());
        assert_eq!(CompressionType::Zstd.as_str(), "zstd");
        assert_eq!(CompressionType::from_flag(0xFFFF_FFFC), CompressionType::None);
    }

    #[test]
    fn test_block_header_bytes() {
        let header = BlockHeader {
            raw_len: 1000,
            stored_len: 420,
            record_count: 17,
        };
        assert_eq!(BlockHeader::from_bytes(&header.to_bytes()), header);
    }

    #[test]
    fn test_trailer_bytes() {
        let path = Path::new("t.rec");
        let trailer = FileTrailer {
            record_count: 3,
            block_count: 1,
            payload_bytes: 12,
            checksum: 0xDEAD_BEEF,
        };
        let bytes = trailer.to_bytes(path).unwrap();
        assert_eq!(FileTrailer::from_bytes(&bytes, path).unwrap(), trailer);
        assert!(FileTrailer::from_bytes(&bytes[..5], path).is_err());
    }

    #[test]
    fn test_block_compression() {
        let path = Path::new("block");
        let data: Vec<u8> = (0..4096).map(|i| (i % 7) as u8).collect();

        for compression in [CompressionType::None, CompressionType::Lz4, CompressionType::Zstd] {
            let stored = compress_block(&data, compression, 3, path).unwrap();
            let raw = decompress_block(&stored, compression, data.len(), path).unwrap();
            assert_eq!(raw, data, "{}", compression.as_str());
        }
    }

    #[test]
    fn test_decompress_detects_wrong_length() {
        let path = Path::new("block");
        let result = decompress_block(b"abcd", CompressionType::None, 5, path);
        assert!(matches!(result, Err(ShuffleError::Format { .. })));
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"hello"), checksum(b"hello"));
        assert_ne!(checksum(b"hello"), checksum(b"world"));
    }
}
