//! Storage key validation.
//!
//! Storage keys are relative paths. Whether they end up on a local disk or as
//! an S3 object key, they must never climb out of the configured root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage key.
///
/// `.` segments, repeated and trailing separators are dropped and `..` is
/// resolved, as long as it never leaves the storage root. Null bytes and
/// Windows path prefixes are rejected, as is anything that normalizes to an
/// empty key.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use songbook_storage::validate_path;
///
/// assert!(validate_path("songbooks/ab/abcdef.pdf").is_ok());
/// assert!(validate_path("../outside.pdf").is_err());
/// assert!(validate_path("songbooks/../../outside.pdf").is_err());
/// assert_eq!(
///     validate_path("songbooks//./ab/../cd/key.json/").unwrap(),
///     Path::new("songbooks/cd/key.json")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut segments = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(segment) => {
                // Path::components() lets null bytes through on Unix, but the
                // syscalls underneath would silently truncate at them.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                segments.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if segments.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(segments.into_iter().collect())
}
