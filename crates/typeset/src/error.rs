//! Typeset Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;
use std::time::Duration;

/// A typesetting error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for typesetting operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("no LaTeX engine found on PATH (tried {})", _0.join(", "))]
    EngineNotFound(#[error(not(source))] Vec<&'static str>),
    /// The engine ran but produced no usable PDF. Carries an excerpt of the
    /// engine log around the first error.
    #[display("typesetting failed:\n{_0}")]
    Failed(#[error(not(source))] String),
    #[display("typesetting did not finish within {_0:?}")]
    Timeout(#[error(not(source))] Duration),
    /// A configured asset file or directory does not exist.
    #[display("asset not found: {}", _0.display())]
    AssetNotFound(#[error(not(source))] PathBuf),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// The same source fails the same way every time; only a slow machine
    /// might fare better on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
