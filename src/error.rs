//! Error taxonomy for ingestion and cleaning.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the library can surface to its caller.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("data quality error: {0}")]
    DataQuality(String),

    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
}

impl IngestError {
    /// Map an `io::Error` raised while opening `path`, keeping "not found" distinct.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            IngestError::NotFound(path)
        } else {
            IngestError::Io { path, source }
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        IngestError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
