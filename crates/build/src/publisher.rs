//! Publishing stamped songbooks to storage, and finding earlier ones.
//!
//! An artifact is two objects under the same key: the PDF, then a JSON
//! [`ArtifactDescriptor`]. The descriptor is written last and only after the
//! PDF made it, so its presence is what marks an artifact as complete.

use crate::error::{ErrorKind, Result, StorageFailure};
use crate::fingerprint::Fingerprint;
use crate::keys::{ArtifactKey, KeyGenerator};
use crate::options::BuildOptions;
use crate::stamper::{IndexEntry, StampedDocument};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use songbook_catalog::SongId;
use songbook_storage::BackendHandle;
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::instrument;

/// Everything a caller needs to know about a published songbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Storage key of the PDF.
    pub key: String,
    pub fingerprint: Fingerprint,
    pub pages: u32,
    /// One entry per requested song, in request order.
    pub songs: Vec<IndexEntry>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ArtifactDescriptor {
    /// First page of each song. A song requested twice maps to its earlier
    /// occurrence; `songs` has both.
    pub fn song_pages(&self) -> HashMap<SongId, u32> {
        let mut pages = HashMap::with_capacity(self.songs.len());
        for entry in &self.songs {
            pages.entry(entry.id.clone()).or_insert(entry.page);
        }
        pages
    }
}

pub struct Publisher {
    backend: BackendHandle,
    keys: KeyGenerator,
}

impl Publisher {
    pub fn new(backend: BackendHandle, keys: KeyGenerator) -> Self {
        Self { backend, keys }
    }

    pub fn key(&self, fingerprint: &Fingerprint, options: &BuildOptions, songs: usize) -> Result<ArtifactKey> {
        self.keys.generate(fingerprint, options, songs)
    }

    /// The descriptor of a complete artifact stored under `key` for this
    /// fingerprint, if there is one.
    #[instrument(skip_all, fields(backend = self.backend.name(), key = key.base()))]
    pub async fn lookup(&self, fingerprint: &Fingerprint, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        let descriptor_path = key.descriptor();
        if !self.backend.exists(&descriptor_path).await.map_err(ErrorKind::storage)? {
            return Ok(None);
        }
        let bytes = self.backend.read(&descriptor_path).await.map_err(ErrorKind::storage)?;
        let descriptor: ArtifactDescriptor =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Storage(StorageFailure::Fatal))?;
        if &descriptor.fingerprint != fingerprint {
            tracing::warn!(stored = %descriptor.fingerprint.short(), "Key holds a different build; rebuilding");
            return Ok(None);
        }
        if !self.backend.exists(&key.pdf()).await.map_err(ErrorKind::storage)? {
            tracing::warn!("Descriptor without its PDF; rebuilding");
            return Ok(None);
        }
        tracing::debug!(pages = descriptor.pages, "Found published songbook");
        Ok(Some(descriptor))
    }

    /// Upload the PDF, then its descriptor.
    #[instrument(skip_all, fields(backend = self.backend.name(), key = key.base(), bytes = stamped.pdf.len()))]
    pub async fn publish(
        &self,
        fingerprint: &Fingerprint,
        key: &ArtifactKey,
        stamped: StampedDocument,
    ) -> Result<ArtifactDescriptor> {
        let pdf_path = key.pdf();
        self.backend.write(&pdf_path, &stamped.pdf).await.map_err(ErrorKind::storage)?;

        let now = OffsetDateTime::now_utc();
        let descriptor = ArtifactDescriptor {
            key: pdf_path.to_string_lossy().into_owned(),
            fingerprint: fingerprint.clone(),
            pages: stamped.pages,
            songs: stamped.entries,
            // Whole seconds, so a descriptor read back compares equal.
            created_at: now.replace_nanosecond(0).unwrap_or(now),
        };
        let json = serde_json::to_vec_pretty(&descriptor).or_raise(|| ErrorKind::Storage(StorageFailure::Fatal))?;
        self.backend.write(&key.descriptor(), &json).await.map_err(ErrorKind::storage)?;
        tracing::info!(pages = descriptor.pages, "Published songbook");
        Ok(descriptor)
    }
}
