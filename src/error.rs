//! Error types for prox.

use thiserror::Error;

/// Errors that can occur while building, loading, or searching an index.
///
/// Structural invariant violations surface as [`IndexError::Corrupt`]: they
/// indicate a bug or a damaged index file and are never retried or silently
/// recovered.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying I/O failure while reading or writing a vector set or index file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Query vector has a different dimension than the indexed vectors.
    #[error("dimension mismatch: query has {query} dimensions, index has {index}")]
    DimensionMismatch { query: usize, index: usize },

    /// An index file does not describe the vector set it was opened against.
    #[error("index does not match vector set: {0}")]
    Mismatch(String),

    /// Internal consistency failure: the graph or an index file violates a
    /// structural invariant.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// A distance job failed to complete within its deadline.
    #[error("distance job for vector {create} (chunk {chunk}) did not finish within {timeout_secs}s")]
    JobTimeout {
        create: u32,
        chunk: usize,
        timeout_secs: u64,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
