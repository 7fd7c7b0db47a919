//! Storage backend trait and implementations.
//!
//! [`StorageBackend`] is deliberately tiny: the publisher checks whether an
//! artifact exists, reads descriptors back, and writes new artifacts. Local
//! filesystem and S3-compatible backends implement it for real; the
//! in-memory [`MockBackend`] (feature `mock`) implements it for tests.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for artifact storage.
///
/// All keys are relative to the backend's root (a directory, or a bucket plus
/// optional prefix) and are validated with
/// [`validate_path`](crate::validate_path) before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use songbook_storage::{backend::StorageBackend, error::Result};
///
/// async fn descriptor_if_present(backend: &dyn StorageBackend) -> Result<Option<Vec<u8>>> {
///     let key = Path::new("songbooks/ab/ab12cd.json");
///     if backend.exists(key).await? {
///         Ok(Some(backend.read(key).await?))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Check if a key exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read the complete contents stored under a key.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing is
    /// stored there.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Store `data` under a key, replacing anything already there.
    ///
    /// # Notes
    /// - Implementations create intermediate directories as needed.
    /// - A failed write must never leave a truncated object visible under
    ///   `path`; readers either see the old contents, nothing, or all of
    ///   `data`.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
}
