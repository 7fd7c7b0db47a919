//! Build Error Types
//!
//! Errors from the catalog, typesetting and storage crates are raised into
//! [`ErrorKind`] so that callers only have one taxonomy to act on, while the
//! original error stays in the tree underneath.

use derive_more::{Display, Error};
use songbook_catalog::SongId;
use std::time::Duration;

/// A build error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for build operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a storage failure is worth another attempt.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum StorageFailure {
    #[display("retryable")]
    Retryable,
    #[display("fatal")]
    Fatal,
}

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("no songs selected")]
    EmptySelection,
    /// Every requested id the catalog couldn't resolve, once each, in request order.
    #[display("unknown song ids: {}", join(_0))]
    UnknownSong(#[error(not(source))] Vec<SongId>),
    #[display("could not read songs from the catalog")]
    Catalog,
    /// A song's content can't be typeset as written. Part and line are 1-based;
    /// part 0 is the title and author, line 0 a part's label.
    #[display("song {song}, part {part}, line {line}: {reason}")]
    Template { song: SongId, part: usize, line: usize, reason: String },
    /// The document template itself is broken.
    #[display("document template: {_0}")]
    Document(#[error(not(source))] String),
    /// The engine failed. Carries an excerpt of its log.
    #[display("compilation failed:\n{_0}")]
    Compilation(#[error(not(source))] String),
    #[display("compilation did not finish within {_0:?}")]
    CompilationTimeout(#[error(not(source))] Duration),
    /// Songs whose first page couldn't be found in the compiled document.
    #[display("could not resolve pages for: {}", join(_0))]
    IndexResolution(#[error(not(source))] Vec<SongId>),
    #[display("storage error ({_0})")]
    Storage(#[error(not(source))] StorageFailure),
    #[display("could not stamp the compiled PDF")]
    Pdf,
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Only storage hiccups qualify. The same selection fails to assemble,
    /// compile or stamp the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageFailure::Retryable))
    }

    pub(crate) fn storage(err: songbook_storage::error::Error) -> Error {
        let failure = if err.is_retryable() { StorageFailure::Retryable } else { StorageFailure::Fatal };
        err.raise(Self::Storage(failure))
    }

    pub(crate) fn typeset(err: songbook_typeset::error::Error) -> Error {
        use songbook_typeset::error::ErrorKind as Typeset;
        let kind = match &*err {
            Typeset::Failed(excerpt) => Self::Compilation(excerpt.clone()),
            Typeset::Timeout(timeout) => Self::CompilationTimeout(*timeout),
            Typeset::Io => Self::Io,
            other => Self::Compilation(other.to_string()),
        };
        err.raise(kind)
    }
}

fn join(ids: &[SongId]) -> String {
    ids.iter().map(SongId::as_str).collect::<Vec<_>>().join(", ")
}
