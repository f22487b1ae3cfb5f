//! Error types for database operations.

/// A result type returning database errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for database operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A name or raw-id lookup failed. Recoverable locally.
    #[error("not found: {0}")]
    NotFound(String),
    /// An object id refers to a destroyed slot.
    #[error("stale object id: {0}")]
    BadOid(String),
    /// A binary stream is malformed.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),
    /// A binary stream carries a schema version this build cannot read.
    #[error("unknown schema version {0}")]
    UnknownSchema(u32),
    /// The requested operation is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
