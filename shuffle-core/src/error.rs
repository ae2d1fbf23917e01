// shuffle-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShuffleError {

    #[error("Input not found: '{path}'")]
    InputNotFound {
        path: PathBuf,
    },

    #[error("Malformed record stream '{path}': {message}")]
    Format {
        path: PathBuf,
        message: String,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Cleanup of '{path}' failed: {message}")]
    Cleanup {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<ShuffleError>>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ShuffleError>;

impl ShuffleError {

    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        Self::InputNotFound { path: path.into() }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Wraps a failure hit while removing temporary state.
    pub fn cleanup(path: impl Into<PathBuf>, source: ShuffleError) -> Self {
        Self::Cleanup {
            path: path.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True for errors raised by the filesystem rather than by malformed data.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
