//! Song records as the build pipeline sees them.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Catalog identifier of a song, e.g. `A-001`.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Allocate the id a new song with this title would get: the title's
    /// initial letter (transliterated to ASCII, uppercased) and the first
    /// free three-digit number for that letter.
    ///
    /// Returns `None` for titles with nothing to take a letter from.
    ///
    /// ```
    /// use std::collections::HashSet;
    /// use songbook_catalog::SongId;
    ///
    /// let taken: HashSet<SongId> = ["A-001", "A-003"].into_iter().map(SongId::from).collect();
    /// assert_eq!(SongId::allocate("Ábba pater", &taken), Some(SongId::from("A-002")));
    /// assert_eq!(SongId::allocate("  ", &taken), None);
    /// ```
    pub fn allocate(title: &str, taken: &HashSet<SongId>) -> Option<Self> {
        let letter = deunicode::deunicode(title.trim()).chars().find(|c| !c.is_whitespace())?.to_ascii_uppercase();
        (1..).map(|n| Self(format!("{letter}-{n:03}"))).find(|id| !taken.contains(id))
    }
}

impl From<&str> for SongId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SongId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for SongId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub id: SongId,
    pub title: String,
    pub author: Option<String>,
    pub categories: BTreeSet<String>,
    pub body: SongBody,
    /// Reviewed by an editor.
    pub checked: bool,
    /// Already appeared in a printed songbook.
    pub printed: bool,
}

impl SongRecord {
    /// A record with no author, categories or flags. Mostly for tests and fixtures.
    pub fn new(id: impl Into<SongId>, title: impl Into<String>, body: SongBody) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            categories: BTreeSet::new(),
            body,
            checked: false,
            printed: false,
        }
    }
}

/// Ordered song parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongBody {
    pub parts: Vec<SongPart>,
}

impl SongBody {
    pub fn new(parts: Vec<SongPart>) -> Self {
        Self { parts }
    }

    /// Parse the stored `song_parts` JSON: a list of `{"type": .., "lines": [..]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawPart> =
            serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData("song_parts".to_string()))?;
        Ok(Self::from_raw(raw))
    }

    pub(crate) fn from_raw(raw: Vec<RawPart>) -> Self {
        Self {
            parts: raw.into_iter().map(|p| SongPart { kind: PartKind::from_label(&p.kind), lines: p.lines }).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongPart {
    pub kind: PartKind,
    /// Lyric lines with inline `[Am]` chord and `[^+2]` transposition markers.
    pub lines: Vec<String>,
}

impl SongPart {
    pub fn new(kind: PartKind, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { kind, lines: lines.into_iter().map(Into::into).collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Verse,
    Chorus,
    Bridge,
    /// Anything else, keeping the label it was stored with.
    Other(String),
}

impl PartKind {
    /// Interpret a stored part label.
    ///
    /// Labels are matched case- and accent-insensitively, ignoring a trailing
    /// number (`verse2`, `Sloha 3`).
    ///
    /// ```
    /// use songbook_catalog::PartKind;
    ///
    /// assert_eq!(PartKind::from_label("Refrén"), PartKind::Chorus);
    /// assert_eq!(PartKind::from_label("verse2"), PartKind::Verse);
    /// assert_eq!(PartKind::from_label("Coda"), PartKind::Other("Coda".to_string()));
    /// ```
    pub fn from_label(label: &str) -> Self {
        let normalized = deunicode::deunicode(label.trim()).to_lowercase();
        let stem = normalized.trim_end_matches(|c: char| c.is_ascii_digit() || c.is_whitespace() || c == '.');
        match stem {
            "verse" | "vers" | "sloka" | "sloha" | "strofa" => Self::Verse,
            "chorus" | "refren" | "ref" | "refrain" => Self::Chorus,
            "bridge" | "most" => Self::Bridge,
            _ => Self::Other(label.trim().to_string()),
        }
    }
}

/// Part as stored in the catalog.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub lines: Vec<String>,
}
