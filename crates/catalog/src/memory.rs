use crate::error::Result;
use crate::{Catalog, SongId, SongRecord};
use async_trait::async_trait;
use std::collections::HashMap;

/// Catalog backed by a map, for tests and for catalogs loaded up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    songs: HashMap<SongId, SongRecord>,
}

impl MemoryCatalog {
    pub fn new(songs: impl IntoIterator<Item = SongRecord>) -> Self {
        Self { songs: songs.into_iter().map(|song| (song.id.clone(), song)).collect() }
    }

    /// Add or replace a song.
    pub fn insert(&mut self, song: SongRecord) -> Option<SongRecord> {
        self.songs.insert(song.id.clone(), song)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_songs_by_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, SongRecord>> {
        Ok(ids.iter().filter_map(|id| self.songs.get(id).map(|song| (id.clone(), song.clone()))).collect())
    }
}
