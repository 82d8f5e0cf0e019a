use std::io;
use std::result;

use thiserror::Error;

/// Custom result type for store operations
pub type Result<T> = result::Result<T, Error>;

/// Store error kinds
#[derive(Debug, Error)]
pub enum Error {
    /// Bad path, permission denied, or conflicting open flags
    #[error("cannot open store: {0}")]
    Open(String),
    /// Read/write/grow failure on the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Directory or chain points outside the valid page range
    #[error("store is corrupted: {0}")]
    Corrupted(String),
    /// No matching key found
    #[error("key not found")]
    NotFound,
    /// Entry called with no prior successful fetch
    #[error("no current entry; call fetch first")]
    NoCurrentEntry,
    /// Operation on a closed handle
    #[error("handle is closed")]
    Closed,
    /// File is not a valid rdbm file
    #[error("not a valid rdbm file")]
    Invalid,
    /// On-disk format or hash version mismatch
    #[error("store version mismatch")]
    VersionMismatch,
    /// Key is empty or longer than the supported maximum
    #[error("bad key size")]
    BadKeySize,
    /// Value is longer than the supported maximum
    #[error("bad value size")]
    BadValSize,
    /// Mutation attempted on a store opened read-only
    #[error("store is read-only")]
    ReadOnly,
}

impl Error {
    /// Whether the error indicates a missing key rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
