//! Server-side error type for the HTTP crate.

/// Failures while configuring or running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid basic auth spec (expected user:password)")]
    InvalidAuth,
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;
