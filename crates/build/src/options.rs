use serde::{Deserialize, Serialize};

/// Knobs for one songbook build.
///
/// Every field takes part in the fingerprint, so changing any of them
/// produces a different artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Append an alphabetical index of song titles.
    pub include_index: bool,
    /// Page numbers in the footer and the current song's title as a running
    /// header on continuation pages.
    pub page_numbering: bool,
    /// Title for a title page. No title page when `None`.
    pub title_page: Option<String>,
    /// Typeset chords above the lyrics. `false` gives a lyrics-only edition.
    pub show_chords: bool,
    /// Stamp each song's catalog id in a badge on its first page.
    pub song_id_badges: bool,
    pub index_heading: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_index: true,
            page_numbering: true,
            title_page: None,
            show_chords: true,
            song_id_badges: false,
            index_heading: "Index".to_string(),
        }
    }
}
