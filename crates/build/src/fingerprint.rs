use crate::assembler::AssembledSource;
use crate::options::BuildOptions;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Bumped whenever the meaning of a build changes without the source or
/// options changing, e.g. a new stamping layout.
const DOMAIN: &[u8] = b"songbook/v1";

/// Hex digits in a full fingerprint.
const HEX_LEN: usize = 2 * blake3::OUT_LEN;

/// Content hash identifying a build: same songs, same content and same
/// options give the same fingerprint.
///
/// Deserializing checks the shape, so a fingerprint read back from storage is
/// always 64 lowercase hex digits.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.len() == HEX_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !hex {
            return Err(format!("not a songbook fingerprint: {value:?}"));
        }
        Ok(Self(value))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl Fingerprint {
    pub fn compute(source: &AssembledSource, options: &BuildOptions) -> Self {
        let mut hasher = blake3::Hasher::new();
        field(&mut hasher, DOMAIN);
        field(&mut hasher, &[u8::from(options.include_index), u8::from(options.page_numbering)]);
        field(&mut hasher, &[u8::from(options.show_chords), u8::from(options.song_id_badges)]);
        match &options.title_page {
            Some(title) => field(&mut hasher, format!("title:{title}").as_bytes()),
            None => field(&mut hasher, b"untitled"),
        }
        field(&mut hasher, options.index_heading.as_bytes());
        for anchor in &source.anchors {
            field(&mut hasher, anchor.token.as_bytes());
            field(&mut hasher, anchor.song.as_str().as_bytes());
            field(&mut hasher, anchor.title.as_bytes());
        }
        field(&mut hasher, source.text.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for logs and file names.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

/// Length-prefixed, so that no two different field sequences hash the same bytes.
fn field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Anchor;
    use songbook_catalog::SongId;

    fn source(text: &str, titles: &[&str]) -> AssembledSource {
        AssembledSource {
            text: text.to_string(),
            anchors: titles
                .iter()
                .enumerate()
                .map(|(i, title)| Anchor {
                    token: format!("sb{:04}", i + 1),
                    song: SongId::from(format!("X-{i:03}")),
                    title: title.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_stable() {
        let options = BuildOptions::default();
        let a = Fingerprint::compute(&source("doc", &["One", "Two"]), &options);
        let b = Fingerprint::compute(&source("doc", &["One", "Two"]), &options);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
        assert!(a.as_str().starts_with(a.short()));
    }

    #[test]
    fn test_every_input_counts() {
        let options = BuildOptions::default();
        let base = Fingerprint::compute(&source("doc", &["One"]), &options);
        assert_ne!(base, Fingerprint::compute(&source("doc!", &["One"]), &options));
        assert_ne!(base, Fingerprint::compute(&source("doc", &["Uno"]), &options));
        let variants = [
            BuildOptions { include_index: false, ..options.clone() },
            BuildOptions { page_numbering: false, ..options.clone() },
            BuildOptions { song_id_badges: true, ..options.clone() },
            BuildOptions { index_heading: "Obsah".to_string(), ..options.clone() },
            BuildOptions { title_page: Some(String::new()), ..options.clone() },
        ];
        for variant in variants {
            assert_ne!(base, Fingerprint::compute(&source("doc", &["One"]), &variant), "{variant:?}");
        }
    }

    #[test]
    fn test_deserialize_checks_shape() {
        let fingerprint = Fingerprint::compute(&source("doc", &["One"]), &BuildOptions::default());
        let json = serde_json::to_string(&fingerprint).unwrap();
        assert_eq!(json, format!("\"{}\"", fingerprint.as_str()));
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fingerprint);

        let upper = format!("\"{}\"", fingerprint.as_str().to_uppercase());
        for bad in [r#""aaaaaaaaaaaéééé""#, r#""abc123""#, r#""""#, upper.as_str()] {
            assert!(serde_json::from_str::<Fingerprint>(bad).is_err(), "{bad}");
        }
    }
}
