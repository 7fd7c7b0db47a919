//! Storage keys for published songbooks.
//!
//! Keys are rendered from a user-configured [upon] template. Besides upon's
//! own syntax, two helpers are available:
//!
//! - **`slug`**: turns a title into a URL-safe segment. `&` becomes `and`,
//!   other punctuation is dropped and long titles are cut at a word.
//! - **`prefix`**: the first `n` characters, as `{{ value|prefix: n }}`.
//!
//! # Template Variables
//!
//! | Variable      | Type     | Description                                  |
//! |---------------|----------|----------------------------------------------|
//! | `fingerprint` | `String` | Full hex fingerprint of the build            |
//! | `short`       | `String` | First 12 hex digits of the fingerprint       |
//! | `title`       | `String` | Title page text, empty without a title page  |
//! | `songs`       | `usize`  | Number of requested entries                  |
//!
//! `.pdf` and `.json` are appended for the two objects of an artifact.
//!
//! ```
//! use songbook_build::KeyGenerator;
//!
//! let keys: KeyGenerator = "books/{{ title|slug }}-{{ short }}".parse().unwrap();
//! # let _ = keys;
//! ```

use crate::error::{Error, ErrorKind, Result, StorageFailure};
use crate::fingerprint::Fingerprint;
use crate::options::BuildOptions;
use exn::{OptionExt, ResultExt};
use songbook_storage::validate_path;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

pub const DEFAULT_KEY_TEMPLATE: &str = "songbooks/{{ fingerprint|prefix: 2 }}/{{ fingerprint }}";

/// Where one artifact lives, without extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    base: String,
}

impl ArtifactKey {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn pdf(&self) -> PathBuf {
        PathBuf::from(format!("{}.pdf", self.base))
    }

    pub fn descriptor(&self) -> PathBuf {
        PathBuf::from(format!("{}.json", self.base))
    }
}

/// Renders storage keys from a template, compiled once up front.
pub struct KeyGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}

impl FromStr for KeyGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Storage(StorageFailure::Fatal))?;
        Ok(Self { engine, template })
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        DEFAULT_KEY_TEMPLATE.parse().unwrap_or_else(|_| unreachable!("default key template compiles"))
    }
}

impl KeyGenerator {
    #[instrument(skip_all, fields(fingerprint = %fingerprint.short()))]
    pub fn generate(&self, fingerprint: &Fingerprint, options: &BuildOptions, songs: usize) -> Result<ArtifactKey> {
        let rendered = self
            .template
            .render(
                &self.engine,
                upon::value! {
                    fingerprint: fingerprint.as_str(),
                    short: fingerprint.short(),
                    title: options.title_page.as_deref().unwrap_or_default(),
                    songs: songs as u64,
                },
            )
            .to_string()
            .or_raise(|| ErrorKind::Storage(StorageFailure::Fatal))?;
        Ok(ArtifactKey { base: Self::normalize(rendered)? })
    }

    /// Trims each segment, drops empty ones and checks the result stays
    /// inside the storage root.
    fn normalize(key: String) -> Result<String> {
        let key = key.split('/').map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/");
        validate_path(&key)
            .map_err(|err| err.raise(ErrorKind::Storage(StorageFailure::Fatal)))?
            .to_str()
            .map(str::to_string)
            .ok_or_raise(|| ErrorKind::Storage(StorageFailure::Fatal))
    }
}

mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Longest slug kept, cut back to the last whole word.
    const MAX_SLUG: usize = 48;

    /// Song and book titles as key segments: `&` reads as "and", other
    /// punctuation is dropped rather than hyphenated ("Rock'n'Roll" becomes
    /// `rocknroll`), and long titles are cut at a word.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => write!(f, "{}", title_slug(s))?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    pub(super) fn title_slug(title: &str) -> String {
        let words: String = title
            .replace('&', " and ")
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
            .collect();
        let slug = slugify!(&words);
        if slug.len() <= MAX_SLUG {
            return slug;
        }
        // Slugs are ASCII, so byte offsets are char offsets.
        match slug[..=MAX_SLUG].rfind('-') {
            Some(cut) if cut > 0 => slug[..cut].to_string(),
            _ => slug[..MAX_SLUG].to_string(),
        }
    }

    /// The first `n` characters, for sharding keys by fingerprint prefix.
    fn prefix(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("prefix", prefix);
    }
}
