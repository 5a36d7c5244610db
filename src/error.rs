//! Crate-wide error type.
//!
//! Errors are classified by how they surface to callers: bad input rejects at
//! the boundary, not-found maps to 404/empty results, upstream failures carry
//! the final retry error, corruption marks a skippable unit, and everything
//! else (database, I/O) aborts the current operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("corrupt data: {0}")]
    Corruption(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// True when the error should surface as a 404 / empty result rather
    /// than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Db(sqlx::Error::RowNotFound))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corruption(err.to_string())
    }
}
