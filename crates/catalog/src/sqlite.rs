//! Read-only access to the `song` table of an existing catalog database.

use crate::error::{ErrorKind, Result};
use crate::{Catalog, SongBody, SongId, SongRecord};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::instrument;

// Reads only; a couple of connections is plenty.
const MAX_CONNECTIONS: u32 = 2;
// Well below SQLITE_MAX_VARIABLE_NUMBER on any build.
const IDS_PER_QUERY: usize = 500;

#[derive(Debug, FromRow)]
struct SongRow {
    song_id: String,
    version_name: Option<String>,
    title: String,
    author: Option<String>,
    categories: Option<String>,
    song_parts: String,
    admin_checked: Option<bool>,
    printed: Option<bool>,
}

impl TryFrom<SongRow> for SongRecord {
    type Error = crate::error::Error;

    fn try_from(row: SongRow) -> Result<Self> {
        let body = SongBody::from_json(&row.song_parts)
            .map_err(|err| err.raise(ErrorKind::InvalidData(format!("song_parts of {}", row.song_id))))?;
        Ok(Self {
            id: SongId::from(row.song_id),
            title: row.title,
            author: row.author.filter(|a| !a.trim().is_empty()),
            categories: row
                .categories
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            body,
            checked: row.admin_checked.unwrap_or(false),
            printed: row.printed.unwrap_or(false),
        })
    }
}

/// Catalog reading the `song` table of a catalog database.
///
/// The database is opened read-only and never migrated; it belongs to
/// whatever manages the songs.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(std::time::Duration::from_millis(1500));
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool })
    }

    /// Use an existing pool, e.g. one shared with other readers.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_rows(&self, ids: &[&str]) -> Result<Vec<SongRow>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT song_id, version_name, title, author, categories, song_parts, admin_checked, printed \
             FROM song WHERE song_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        query.build_query_as::<SongRow>().fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)
    }
}

/// Pick the one row an id stands for.
///
/// Several rows can share a `song_id` when alternative versions of a song are
/// stored. The unversioned row wins; without exactly one of those the id is
/// ambiguous and left unresolved.
fn resolve(id: &str, mut rows: Vec<SongRow>) -> Option<SongRow> {
    if rows.len() == 1 {
        return rows.pop();
    }
    let mut unversioned = rows.into_iter().filter(|r| r.version_name.is_none());
    match (unversioned.next(), unversioned.next()) {
        (Some(row), None) => Some(row),
        _ => {
            tracing::warn!(song_id = id, "Song id matches several records");
            None
        },
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    #[instrument(skip_all, fields(requested = ids.len()))]
    async fn get_songs_by_ids(&self, ids: &[SongId]) -> Result<HashMap<SongId, SongRecord>> {
        let mut unique: Vec<&str> = ids.iter().map(SongId::as_str).collect();
        unique.sort_unstable();
        unique.dedup();

        let mut grouped: HashMap<String, Vec<SongRow>> = HashMap::new();
        for chunk in unique.chunks(IDS_PER_QUERY) {
            for row in self.fetch_rows(chunk).await? {
                grouped.entry(row.song_id.clone()).or_default().push(row);
            }
        }

        let mut songs = HashMap::with_capacity(grouped.len());
        for (id, rows) in grouped {
            if let Some(row) = resolve(&id, rows) {
                let record = SongRecord::try_from(row)?;
                songs.insert(record.id.clone(), record);
            }
        }
        Ok(songs)
    }
}
