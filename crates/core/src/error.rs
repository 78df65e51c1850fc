//! Error types for the STSV datastore.
//!
//! Every public datastore operation maps its failures into [`StoreError`].
//! The set is deliberately closed: the HTTP adapter derives status codes
//! from it and the CLI derives exit behaviour, so new failure modes must
//! either fit an existing variant or be carried as [`StoreError::Io`].

/// Failure modes of datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The blob (or the requested version) does not exist.
    #[error("not found")]
    NotFound,
    /// The logical name does not resolve to a path inside the data root.
    #[error("invalid path")]
    InvalidPath,
    /// The written bytes do not match the expected MD5 digest.
    #[error("hash mismatch")]
    InvalidHash,
    /// The blob is held by another writer's advisory lock.
    #[error("already locked")]
    Locked,
    /// An unlock or lock read was attempted while no lock exists.
    #[error("not locked")]
    Unlocked,
    /// An edit produced content identical to the stored version.
    #[error("not changed")]
    NotChanged,
    /// Any other filesystem failure; surfaced to HTTP clients as 500.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results that can fail with [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;
