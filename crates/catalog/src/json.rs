//! Directory of song JSON files.
//!
//! Each `*.json` file holds one song in the import format:
//!
//! ```json
//! {
//!   "title": "Barka",
//!   "author": "S. Gabaráin",
//!   "categories": ["liturgia"],
//!   "song_parts": [{"type": "verse", "lines": ["[G]Pán kedysi ..."]}]
//! }
//! ```
//!
//! Files may carry their own `song_id`. The rest get one allocated the same
//! way the catalog database does it, in file name order, so a directory
//! always yields the same ids.

use crate::error::{ErrorKind, Result};
use crate::memory::MemoryCatalog;
use crate::model::RawPart;
use crate::{Catalog, SongBody, SongId, SongRecord};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct SongFile {
    #[serde(default)]
    song_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    song_parts: Vec<RawPart>,
    #[serde(default)]
    checked: bool,
    #[serde(default)]
    printed: bool,
}

impl SongFile {
    fn into_record(self, id: SongId) -> SongRecord {
        SongRecord {
            id,
            title: self.title.trim().to_string(),
            // Single-character authors are placeholders ("-", "?") in imported data.
            author: self.author.map(|a| a.trim().to_string()).filter(|a| a.chars().count() > 1),
            categories: self.categories.into_iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect(),
            body: SongBody::from_raw(self.song_parts),
            checked: self.checked,
            printed: self.printed,
        }
    }
}

/// Catalog loaded once from a directory of JSON song files.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    songs: MemoryCatalog,
}

impl JsonCatalog {
    #[instrument(fields(dir = %dir.as_ref().display()), skip(dir))]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut entries = fs::read_dir(dir).await.or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io(dir.to_path_buf()))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path).await.or_raise(|| ErrorKind::Io(path.clone()))?;
            let file: SongFile =
                serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData(path.display().to_string()))?;
            files.push((path, file));
        }
        let catalog = Self::from_files(files)?;
        tracing::info!(songs = catalog.songs.len(), "Loaded song catalog");
        Ok(catalog)
    }

    fn from_files(files: Vec<(PathBuf, SongFile)>) -> Result<Self> {
        let mut taken = HashSet::new();
        for (_, file) in &files {
            if let Some(id) = &file.song_id
                && !taken.insert(SongId::from(id.as_str()))
            {
                exn::bail!(ErrorKind::DuplicateId(id.clone()));
            }
        }

        let mut titles = HashSet::new();
        let mut songs = MemoryCatalog::default();
        for (path, mut file) in files {
            if file.title.trim().is_empty() {
                exn::bail!(ErrorKind::InvalidData(format!("{}: missing title", path.display())));
            }
            if !titles.insert(file.title.trim().to_string()) && file.song_id.is_none() {
                tracing::warn!(path = %path.display(), title = %file.title, "Skipping song with duplicate title");
                continue;
            }
            let id = match file.song_id.take() {
                Some(id) => SongId::from(id),
                None => {
                    let id = SongId::allocate(&file.title, &taken)
                        .ok_or_raise(|| ErrorKind::InvalidData(format!("{}: no initial letter", path.display())))?;
                    taken.insert(id.clone());
                    id
                },
            };
            songs.insert(file.into_record(id));
        }
        Ok(Self { songs })
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn get_songs_by_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, SongRecord>> {
        self.songs.get_songs_by_ids(ids).await
    }
}
