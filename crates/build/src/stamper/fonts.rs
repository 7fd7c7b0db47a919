//! The two standard fonts stamped text is set in, and getting text into them.
//!
//! Both are base-14 Type 1 fonts with `WinAnsiEncoding`, so nothing needs to
//! be embedded. Characters outside that encoding are transliterated.

use lopdf::{Dictionary, dictionary};

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Width used for glyphs without a better guess.
const FALLBACK_WIDTH: u16 = 556;

/// Windows-1252 code points 0x80 to 0x9F.
const CP1252_HIGH: [(char, u8); 27] = [
    ('€', 0x80), ('‚', 0x82), ('ƒ', 0x83), ('„', 0x84), ('…', 0x85), ('†', 0x86), ('‡', 0x87),
    ('ˆ', 0x88), ('‰', 0x89), ('Š', 0x8A), ('‹', 0x8B), ('Œ', 0x8C), ('Ž', 0x8E), ('‘', 0x91),
    ('’', 0x92), ('“', 0x93), ('”', 0x94), ('•', 0x95), ('–', 0x96), ('—', 0x97), ('˜', 0x98),
    ('™', 0x99), ('š', 0x9A), ('›', 0x9B), ('œ', 0x9C), ('ž', 0x9E), ('Ÿ', 0x9F),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Font {
    /// Name in the page's font resources.
    pub resource: &'static str,
    base: &'static str,
    widths: &'static [u16; 95],
}

pub(crate) const REGULAR: Font = Font { resource: "SbF1", base: "Helvetica", widths: &HELVETICA };
pub(crate) const BOLD: Font = Font { resource: "SbF2", base: "Helvetica-Bold", widths: &HELVETICA_BOLD };

impl Font {
    pub(crate) fn dictionary(&self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base,
            "Encoding" => "WinAnsiEncoding",
        }
    }

    /// Width of `text` set at `size` points.
    pub(crate) fn width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = representable(text).chars().map(|c| u32::from(self.glyph_width(c))).sum();
        units as f32 * size / 1000.0
    }

    fn glyph_width(&self, c: char) -> u16 {
        match c {
            ' '..='~' => self.widths[c as usize - 32],
            // Accented Latin-1 letters are about as wide as their base letter.
            _ => deunicode::deunicode_char(c)
                .and_then(|s| s.chars().next())
                .filter(|base| (' '..='~').contains(base))
                .map(|base| self.widths[base as usize - 32])
                .unwrap_or(FALLBACK_WIDTH),
        }
    }

    /// Longest prefix of `text` that, followed by `...`, fits in `max_width`.
    /// `text` itself if it already fits.
    pub(crate) fn truncate(&self, text: &str, size: f32, max_width: f32) -> String {
        if self.width(text, size) <= max_width {
            return text.to_string();
        }
        let mut cut: Vec<char> = text.chars().collect();
        while !cut.is_empty() {
            cut.pop();
            let candidate = format!("{}...", cut.iter().collect::<String>().trim_end());
            if self.width(&candidate, size) <= max_width {
                return candidate;
            }
        }
        "...".to_string()
    }
}

fn winansi(c: char) -> Option<u8> {
    match c {
        ' '..='~' => Some(c as u8),
        '\u{A0}'..='\u{FF}' => Some(c as u32 as u8),
        _ => CP1252_HIGH.iter().find(|(known, _)| *known == c).map(|(_, byte)| *byte),
    }
}

/// `text` with every character WinAnsi can't encode transliterated.
fn representable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if winansi(c).is_some() {
            out.push(c);
        } else if let Some(ascii) = deunicode::deunicode_char(c) {
            out.extend(ascii.chars().filter(|a| (' '..='~').contains(a)));
        } else {
            out.push('?');
        }
    }
    out
}

/// `text` as bytes for a string operand shown in one of these fonts.
pub(crate) fn encode(text: &str) -> Vec<u8> {
    representable(text).chars().filter_map(winansi).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode("Abc 1"), b"Abc 1".to_vec());
        assert_eq!(encode("Pieseň"), b"Piesen".to_vec());
        assert_eq!(encode("Für Élise"), vec![b'F', 0xFC, b'r', b' ', 0xC9, b'l', b'i', b's', b'e']);
        assert_eq!(encode("Ľud – €"), vec![b'L', b'u', b'd', b' ', 0x96, b' ', 0x80]);
    }

    #[test]
    fn test_width() {
        // "Hi" in Helvetica: 722 + 222.
        assert!((REGULAR.width("Hi", 10.0) - 9.44).abs() < 1e-3);
        assert!(BOLD.width("Hi", 10.0) > REGULAR.width("Hi", 10.0));
        assert_eq!(REGULAR.width("é", 10.0), REGULAR.width("e", 10.0));
        assert_eq!(REGULAR.width("", 10.0), 0.0);
    }

    #[test]
    fn test_truncate() {
        let text = "A rather long song title that will not fit";
        let cut = REGULAR.truncate(text, 11.0, 100.0);
        assert!(cut.ends_with("..."));
        assert!(REGULAR.width(&cut, 11.0) <= 100.0);
        assert_eq!(REGULAR.truncate("Short", 11.0, 100.0), "Short");
    }
}
