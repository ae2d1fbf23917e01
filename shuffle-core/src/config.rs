// shuffle-core/src/config.rs

//! Configuration for shuffle jobs.
//!
//! Configuration comes from a TOML file, environment variable overrides
//! (`RSHUF_*`), or plain defaults. Every section is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, ShuffleError};
use crate::records::{CompressionType, RecordLayout};

/// Records per bucket when nothing else is configured.
pub const DEFAULT_BUCKET_SIZE: u64 = 20_000;

// Top-level shuffle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    pub storage: StorageConfig,
    pub shuffle: ShuffleSettings,
    pub records: RecordConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Relative paths are resolved against this directory.
    pub base_path: PathBuf,
    // Buffer size in bytes for file readers and writers.
    pub buffer_size: usize,
}

/// Knobs of the two-phase shuffle itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleSettings {
    /// Target number of records per bucket. Bounds peak memory.
    pub bucket_size: u64,
    /// Seed for the job's random source. A fresh seed is drawn when unset.
    pub seed: Option<u64>,
    /// Parent of the per-job working directory. Defaults to the output
    /// file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Log partitioning progress every this many records.
    pub progress_interval: u64,
}

// Record file layout options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    // Layout of input and output: "framed", "newline", "length-prefixed" or "fixed:N".
    pub layout: String,
    // Block compression for framed files: "none", "lz4" or "zstd".
    pub compression: String,
    // Compression level (zstd only).
    pub compression_level: i32,
    // Uncompressed block size in bytes for the output file.
    pub block_size: usize,
    // Uncompressed block size in bytes for bucket files.
    pub bucket_block_size: usize,
    // Upper bound in bytes for records buffered across all buckets while
    // partitioning. Independent of the number of buckets.
    pub partition_buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
        }
    }
}

impl Default for ShuffleSettings {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            seed: None,
            working_dir: None,
            progress_interval: 100_000,
        }
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            layout: "framed".to_string(),
            compression: "lz4".to_string(),
            compression_level: 3,
            block_size: 1024 * 1024,       // 1 MB
            bucket_block_size: 64 * 1024, // 64 KB
            partition_buffer_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl RecordConfig {
    /// Parsed layout. Call after `validate`.
    pub fn layout(&self) -> Result<RecordLayout> {
        self.layout.parse()
    }

    /// Parsed compression. Call after `validate`.
    pub fn compression(&self) -> Result<CompressionType> {
        self.compression.parse()
    }
}

impl FromStr for ShuffleConfig {
    type Err = ShuffleError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ShuffleError::config_with_source("failed to parse TOML config", e))
    }
}

impl ShuffleConfig {
    // Load and validate configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShuffleError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `RSHUF_` and name the section and field:
    // - `RSHUF_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `RSHUF_SHUFFLE_BUCKET_SIZE` overrides `shuffle.bucket_size`
    // - `RSHUF_SHUFFLE_SEED` overrides `shuffle.seed`
    // - `RSHUF_RECORDS_COMPRESSION` overrides `records.compression`
    //
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("RSHUF_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("RSHUF_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }

        if let Ok(val) = std::env::var("RSHUF_SHUFFLE_BUCKET_SIZE") {
            if let Ok(v) = val.parse() {
                self.shuffle.bucket_size = v;
            }
        }
        if let Ok(val) = std::env::var("RSHUF_SHUFFLE_SEED") {
            if let Ok(v) = val.parse() {
                self.shuffle.seed = Some(v);
            }
        }
        if let Ok(val) = std::env::var("RSHUF_SHUFFLE_WORKING_DIR") {
            self.shuffle.working_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("RSHUF_SHUFFLE_PROGRESS_INTERVAL") {
            if let Ok(v) = val.parse() {
                self.shuffle.progress_interval = v;
            }
        }

        if let Ok(val) = std::env::var("RSHUF_RECORDS_LAYOUT") {
            self.records.layout = val;
        }
        if let Ok(val) = std::env::var("RSHUF_RECORDS_COMPRESSION") {
            self.records.compression = val;
        }
        if let Ok(val) = std::env::var("RSHUF_RECORDS_COMPRESSION_LEVEL") {
            if let Ok(v) = val.parse() {
                self.records.compression_level = v;
            }
        }
        if let Ok(val) = std::env::var("RSHUF_RECORDS_BLOCK_SIZE") {
            if let Ok(v) = val.parse() {
                self.records.block_size = v;
            }
        }
        if let Ok(val) = std::env::var("RSHUF_RECORDS_BUCKET_BLOCK_SIZE") {
            if let Ok(v) = val.parse() {
                self.records.bucket_block_size = v;
            }
        }
        if let Ok(val) = std::env::var("RSHUF_RECORDS_PARTITION_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.records.partition_buffer_size = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(ShuffleError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.shuffle.bucket_size == 0 {
            return Err(ShuffleError::config(
                "shuffle.bucket_size must be greater than 0",
            ));
        }
        if self.shuffle.progress_interval == 0 {
            return Err(ShuffleError::config(
                "shuffle.progress_interval must be greater than 0",
            ));
        }

        self.records.layout()?;
        self.records.compression()?;

        if !(1..=22).contains(&self.records.compression_level) {
            return Err(ShuffleError::config(
                "records.compression_level must be between 1 and 22",
            ));
        }
        if self.records.block_size == 0 {
            return Err(ShuffleError::config(
                "records.block_size must be greater than 0",
            ));
        }
        if self.records.bucket_block_size == 0 {
            return Err(ShuffleError::config(
                "records.bucket_block_size must be greater than 0",
            ));
        }
        if self.records.partition_buffer_size == 0 {
            return Err(ShuffleError::config(
                "records.partition_buffer_size must be greater than 0",
            ));
        }

        Ok(())
    }
}
