//! Reading LaTeX logs.

use regex::Regex;
use std::sync::LazyLock;

/// Lines of context kept before the first error line.
const CONTEXT_BEFORE: usize = 2;
/// Lines of context kept after the first error line.
const CONTEXT_AFTER: usize = 8;
/// Upper bound on excerpt length, in characters.
const MAX_EXCERPT: usize = 2000;

static RERUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(rerun to get|there were undefined references|label\(s\) may have changed)")
        .unwrap_or_else(|_| unreachable!("rerun pattern is a valid regex"))
});

// `! Undefined control sequence.` or, with -file-line-error, `./songbook.tex:42: ...`
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(!|[^\s:]+:\d+: )").unwrap_or_else(|_| unreachable!("error line pattern is a valid regex"))
});

/// Whether the engine asked for another pass to settle references.
pub(crate) fn wants_rerun(log: &str) -> bool {
    RERUN.is_match(log)
}

/// The part of a log worth showing someone: the first error line with a
/// little context, or the tail of the log if no line looks like an error.
pub fn excerpt(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let window = match lines.iter().position(|line| ERROR_LINE.is_match(line)) {
        Some(at) => &lines[at.saturating_sub(CONTEXT_BEFORE)..(at + CONTEXT_AFTER + 1).min(lines.len())],
        None => &lines[lines.len().saturating_sub(CONTEXT_BEFORE + CONTEXT_AFTER + 1)..],
    };
    truncate(&window.join("\n"), MAX_EXCERPT)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
