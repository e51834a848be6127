use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the persistence layer. Extraction and normalization never
/// fail; only reading and writing the storage area does.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} does not hold a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("provenance index {path} is unreadable; refusing to overwrite it")]
    CorruptProvenance { path: PathBuf },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Why one image candidate could not be fetched. Never fatal to a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
