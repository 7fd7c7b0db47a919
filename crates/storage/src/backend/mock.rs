//! In-memory storage backend for testing.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Writes and reads
/// are counted, and writes can be made to fail on demand to exercise error
/// paths in downstream crates.
///
/// # Examples
///
/// ```
/// use songbook_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("songbooks/ab/ab12.json", b"{}")]);
/// assert!(backend.exists(Path::new("songbooks/ab/ab12.json")).await?);
///
/// backend.write(Path::new("songbooks/cd/cd34.pdf"), b"%PDF").await?;
/// assert_eq!(backend.writes(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, Vec<u8>>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
    write_failure: Option<fn(&Path) -> Option<ErrorKind>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            write_failure: None,
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make writes fail wherever `failure` returns an error for the key.
    ///
    /// ```
    /// use songbook_storage::backend::MockBackend;
    /// use songbook_storage::error::ErrorKind;
    ///
    /// // Only descriptors fail to upload.
    /// let backend = MockBackend::default().failing_writes(|path| {
    ///     path.extension().is_some_and(|e| e == "json").then(|| ErrorKind::Network("connection reset".into()))
    /// });
    /// ```
    pub fn failing_writes(mut self, failure: fn(&Path) -> Option<ErrorKind>) -> Self {
        self.write_failure = Some(failure);
        self
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful reads so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<_> = self.storage.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let data = self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        if let Some(kind) = self.write_failure.and_then(|failure| failure(&path)) {
            exn::bail!(kind);
        }
        self.storage.write().await.insert(path, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
