//! Inline markup of lyric lines: `[Am]` chords and `[^+2]` transpositions.

use super::chords::Chord;
use super::escape::escape;

const MAX_TRANSPOSITION: i32 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Chord(&'a str),
    Transpose(i32),
}

/// Split a line into text, chords and transpositions.
///
/// Errors are plain reasons; the caller knows which song and line they
/// belong to.
pub(crate) fn tokenize(line: &str) -> Result<Vec<Token<'_>>, String> {
    reject_control(line)?;
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(at) = rest.find(['[', ']']) {
        if at > 0 {
            tokens.push(Token::Text(&rest[..at]));
        }
        if rest[at..].starts_with(']') {
            return Err("`]` without a matching `[`".to_string());
        }
        let after = &rest[at + 1..];
        let close = match after.find(['[', ']']) {
            Some(close) if after[close..].starts_with(']') => close,
            _ => return Err("`[` is never closed".to_string()),
        };
        let marker = after[..close].trim();
        tokens.push(match marker.strip_prefix('^') {
            Some(shift) => Token::Transpose(transposition(shift)?),
            None if marker.is_empty() => return Err("empty chord marker `[]`".to_string()),
            None => Token::Chord(marker),
        });
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

/// Escape text that takes no markup at all, such as titles and labels.
pub(crate) fn plain(text: &str) -> Result<String, String> {
    reject_control(text)?;
    Ok(escape(text))
}

fn reject_control(text: &str) -> Result<(), String> {
    match text.chars().find(|c| c.is_control() && *c != '\t') {
        Some(c) => Err(format!("control character U+{:04X}", u32::from(c))),
        None => Ok(()),
    }
}

fn transposition(text: &str) -> Result<i32, String> {
    let shift: i32 = text.trim().parse().map_err(|_| format!("invalid transposition `[^{text}]`"))?;
    if !(-MAX_TRANSPOSITION..=MAX_TRANSPOSITION).contains(&shift) {
        return Err(format!("transposition `[^{text}]` is outside -{MAX_TRANSPOSITION}..={MAX_TRANSPOSITION}"));
    }
    Ok(shift)
}

/// Render one lyric line.
///
/// `shift` is the song's running transposition and is updated by any
/// `[^N]` on the line. Returns `None` for a line that only held chords when
/// chords aren't shown.
pub(crate) fn render_line(line: &str, shift: &mut i32, show_chords: bool) -> Result<Option<String>, String> {
    let tokens = tokenize(line)?;
    let mut body = String::new();
    let mut has_chords = false;
    let mut has_text = false;
    for token in tokens {
        match token {
            Token::Text(text) => {
                has_text |= !text.trim().is_empty();
                body.push_str(&escape(text));
            },
            Token::Transpose(by) => *shift += by,
            Token::Chord(chord) => {
                let name = spell(chord, *shift)?;
                has_chords = true;
                if show_chords {
                    body.push_str(r"\ch{");
                    body.push_str(&escape(&name));
                    body.push('}');
                }
            },
        }
    }
    Ok(match (has_text, has_chords && show_chords) {
        (_, true) => Some(format!(r"\chordline{{{body}}}")),
        (true, false) => Some(format!(r"\songline{{{}}}", body.trim_end())),
        (false, false) if has_chords => None,
        (false, false) => Some(r"\songgap".to_string()),
    })
}

/// A chord as it should be printed under the current transposition.
///
/// Without a transposition chords are printed as written, even ones that
/// aren't recognised.
fn spell(chord: &str, shift: i32) -> Result<String, String> {
    if shift % 12 == 0 {
        return Ok(chord.to_string());
    }
    Chord::parse(chord)
        .map(|parsed| parsed.transposed(shift))
        .ok_or_else(|| format!("cannot transpose chord `{chord}`"))
}
