//! Error types for the storage layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing table files.
///
/// Every variant is fatal for the operation that raised it: nothing is
/// partially committed.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File system error (create dir, open, rename, lock).
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Parquet reader or writer failed.
    #[error("parquet error on {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// Arrow array construction or reading failed.
    #[error("arrow error on {path}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },

    /// A stored file's schema does not match the declared table schema.
    #[error("schema mismatch in {path}: expected [{expected}], found [{found}]")]
    Schema {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// A stored value cannot be represented as a record.
    #[error("invalid data in {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// The blocking write task panicked or was cancelled.
    #[error("write task for {path} did not complete: {message}")]
    Task { path: PathBuf, message: String },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parquet(path: impl Into<PathBuf>, source: parquet::errors::ParquetError) -> Self {
        Self::Parquet {
            path: path.into(),
            source,
        }
    }

    pub fn arrow(path: impl Into<PathBuf>, source: arrow::error::ArrowError) -> Self {
        Self::Arrow {
            path: path.into(),
            source,
        }
    }

    pub fn schema(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Schema {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn task(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Task {
            path: path.into(),
            message: message.into(),
        }
    }
}

// No From impls: every variant needs the file path, which the source errors
// don't carry.
