//! Chord names and transposition.
//!
//! A chord is a root note, a free-form suffix (`m`, `7`, `sus4`, `maj7`, ...)
//! and an optional slash bass: `F#m7/C#`. Roots and basses are `A` to `H`
//! with an optional `#`, `b`, `♯` or `♭`. `H` is the central European name
//! for B; chords written with it keep that spelling when transposed.

const SHARPS: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const FLATS: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Note {
    /// Semitones above C.
    pitch: u8,
}

impl Note {
    /// Parse a note at the start of `text`, returning it and the rest.
    fn parse(text: &str) -> Option<(Self, &str, bool)> {
        let mut chars = text.chars();
        let (pitch, german) = match chars.next()? {
            'C' => (0, false),
            'D' => (2, false),
            'E' => (4, false),
            'F' => (5, false),
            'G' => (7, false),
            'A' => (9, false),
            'B' => (11, false),
            'H' => (11, true),
            _ => return None,
        };
        let rest = chars.as_str();
        let (shift, rest) = match rest.chars().next() {
            Some(c @ ('#' | '♯')) => (1, &rest[c.len_utf8()..]),
            Some(c @ ('b' | '♭')) => (11, &rest[c.len_utf8()..]),
            _ => (0, rest),
        };
        Some((Self { pitch: (pitch + shift) % 12 }, rest, german))
    }

    fn transpose(self, semitones: i32) -> Self {
        Self { pitch: (i32::from(self.pitch) + semitones).rem_euclid(12) as u8 }
    }

    fn name(self, flats: bool, german: bool) -> &'static str {
        match (self.pitch, german) {
            (11, true) => "H",
            (10, true) if flats => "B",
            (pitch, _) if flats => FLATS[usize::from(pitch)],
            (pitch, _) => SHARPS[usize::from(pitch)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Chord<'a> {
    root: Note,
    suffix: &'a str,
    bass: Option<Note>,
    german: bool,
}

impl<'a> Chord<'a> {
    pub(crate) fn parse(text: &'a str) -> Option<Self> {
        let (root, rest, german) = Note::parse(text.trim())?;
        let (suffix, bass) = match rest.split_once('/') {
            Some((suffix, bass)) => {
                let (bass, tail, _) = Note::parse(bass)?;
                if !tail.is_empty() {
                    return None;
                }
                (suffix, Some(bass))
            },
            None => (rest, None),
        };
        Some(Self { root, suffix, bass, german })
    }

    /// Spell the chord `semitones` higher (or lower, if negative). Upward
    /// shifts are spelled with sharps, downward ones with flats.
    pub(crate) fn transposed(&self, semitones: i32) -> String {
        let flats = semitones < 0;
        let mut name = String::from(self.root.transpose(semitones).name(flats, self.german));
        name.push_str(self.suffix);
        if let Some(bass) = self.bass {
            name.push('/');
            name.push_str(bass.transpose(semitones).name(flats, self.german));
        }
        name
    }
}
