//! Catalog Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("could not read catalog file: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A record exists but can't be turned into a song.
    #[display("invalid song data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Two catalog files claim the same song id.
    #[display("duplicate song id: {_0}")]
    DuplicateId(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
