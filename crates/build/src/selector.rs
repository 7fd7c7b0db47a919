//! Turning requested ids into song records.

use crate::error::{ErrorKind, Result};
use songbook_catalog::{Catalog, SongId, SongRecord};
use tracing::instrument;

/// Look up every requested song, in request order.
///
/// Duplicated ids give duplicated records. If any id is unknown nothing is
/// returned; the error lists each unknown id once, in the order requested.
#[instrument(skip_all, fields(requested = ids.len()))]
pub async fn select(catalog: &dyn Catalog, ids: &[SongId]) -> Result<Vec<SongRecord>> {
    if ids.is_empty() {
        exn::bail!(ErrorKind::EmptySelection);
    }
    let found = catalog.get_songs_by_ids(ids).await.map_err(|err| err.raise(ErrorKind::Catalog))?;

    let mut songs = Vec::with_capacity(ids.len());
    let mut missing: Vec<SongId> = Vec::new();
    for id in ids {
        match found.get(id) {
            Some(song) => songs.push(song.clone()),
            None if !missing.contains(id) => missing.push(id.clone()),
            None => {},
        }
    }
    if !missing.is_empty() {
        tracing::warn!(missing = missing.len(), "Selection contains unknown songs");
        exn::bail!(ErrorKind::UnknownSong(missing));
    }
    Ok(songs)
}
