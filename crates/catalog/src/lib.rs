//! Song records for songbook builds.
//!
//! The pipeline only ever asks one question of a catalog: "give me these
//! songs". [`Catalog`] answers it for an in-memory set, a directory of JSON
//! song files, or the `song` table of an existing SQLite database.

pub mod error;
mod json;
mod memory;
mod model;
mod sqlite;

pub use crate::json::JsonCatalog;
pub use crate::memory::MemoryCatalog;
pub use crate::model::{PartKind, SongBody, SongId, SongPart, SongRecord};
pub use crate::sqlite::SqliteCatalog;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only source of song records.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up songs by id.
    ///
    /// Ids that don't resolve to exactly one record are simply absent from
    /// the returned map; deciding whether that's an error is up to the caller.
    async fn get_songs_by_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, SongRecord>>;
}

pub type CatalogHandle = Arc<dyn Catalog>;
