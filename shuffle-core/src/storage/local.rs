// shuffle-core/src/storage/local.rs

//! Local filesystem backend.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
use crate::config::StorageConfig;
use crate::error::{Result, ShuffleError};

/// Stores objects as plain files below a base directory.
///
/// Absolute paths bypass the base directory, so the CLI can hand over
/// whatever the user typed.
pub struct LocalStorage {
    base_path: PathBuf,
    buffer_size: usize,
}

impl LocalStorage {
    /// Creates the backend, creating `base_path` if it is missing.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                ShuffleError::storage_with_source(&base_path, "failed to create base directory", e)
            })?;
        }

        Ok(Self {
            base_path,
            buffer_size: config.buffer_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    fn canonical_path(&self, path: &Path) -> Result<PathBuf> {
        let full = self.resolve(path);
        let canonicalize = |p: &Path| {
            fs::canonicalize(p)
                .map_err(|e| ShuffleError::storage_with_source(p, "failed to resolve path", e))
        };

        if full.exists() {
            return canonicalize(&full);
        }
        // Not created yet: resolve the directory it will live in.
        match (full.parent(), full.file_name()) {
            (Some(parent), Some(name)) if parent.exists() => Ok(canonicalize(parent)?.join(name)),
            _ => Ok(full),
        }
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let full = self.resolve(path);
        let meta = fs::metadata(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to read metadata", e))?;

        Ok(ObjectMeta {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full = self.resolve(path);
        let file = File::open(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to open file", e))?;
        let size = file
            .metadata()
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to stat file", e))?
            .len();

        Ok(Box::new(LocalReader {
            reader: BufReader::with_capacity(self.buffer_size, file),
            path: full,
            size,
        }))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        self.open_write_buffered(path, self.buffer_size)
    }

    fn open_write_buffered(
        &self,
        path: &Path,
        buffer_size: usize,
    ) -> Result<Box<dyn StorageWriter>> {
        let full = self.resolve(path);

        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    ShuffleError::storage_with_source(parent, "failed to create parent directories", e)
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to create file", e))?;

        Ok(Box::new(LocalWriter {
            writer: BufWriter::with_capacity(buffer_size, file),
            path: full,
        }))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to delete file", e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_dir_all(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to remove directory", e))
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let full = self.resolve(dir);
        if !full.exists() {
            return Ok(Vec::new());
        }
        if !full.is_dir() {
            return Err(ShuffleError::storage(&full, "path is not a directory"));
        }

        let mut names = Vec::new();
        let entries = fs::read_dir(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to read directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                ShuffleError::storage_with_source(&full, "failed to read directory entry", e)
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        fs::create_dir_all(&full)
            .map_err(|e| ShuffleError::storage_with_source(&full, "failed to create directories", e))
    }
}

struct LocalReader {
    reader: BufReader<File>,
    path: PathBuf,
    size: u64,
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(start)).map_err(|e| {
            ShuffleError::storage_with_source(&self.path, format!("failed to seek to {start}"), e)
        })?;

        let mut buf = vec![0u8; length];
        self.reader.read_exact(&mut buf).map_err(|e| {
            ShuffleError::storage_with_source(
                &self.path,
                format!("failed to read {length} bytes at {start}"),
                e,
            )
        })?;
        Ok(buf)
    }
}

struct LocalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to flush writer", e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| ShuffleError::storage_with_source(&self.path, "failed to sync file", e))
    }
}
