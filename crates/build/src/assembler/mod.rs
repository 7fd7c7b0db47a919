//! Rendering song records into one LaTeX document.
//!
//! Every requested entry gets an anchor token (`sb0001`, `sb0002`, ...) by
//! position, emitted with `\songanchor` right before the song's title, so that
//! the same song requested twice still has two distinguishable first pages.

mod chords;
mod escape;
mod markup;
mod template;

pub use self::template::{BUILTIN_TEMPLATE, Builtins, DocumentTemplate};
use crate::error::{ErrorKind, Result};
use crate::options::BuildOptions;
use serde::{Deserialize, Serialize};
use songbook_catalog::{PartKind, SongId, SongPart, SongRecord};
use std::fmt::Write;
use tracing::instrument;

/// Marks where a requested song starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub token: String,
    pub song: SongId,
    pub title: String,
}

/// Complete LaTeX source plus one anchor per requested entry, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSource {
    pub text: String,
    pub anchors: Vec<Anchor>,
}

pub struct Assembler {
    template: DocumentTemplate,
}

impl Assembler {
    pub fn new(template: DocumentTemplate) -> Self {
        Self { template }
    }

    /// Render `songs` into a complete document.
    ///
    /// The same songs and options always give the same text.
    #[instrument(skip_all, fields(songs = songs.len()))]
    pub fn assemble(&self, songs: &[SongRecord], options: &BuildOptions) -> Result<AssembledSource> {
        let mut body = String::new();
        let mut anchors = Vec::with_capacity(songs.len());
        for (position, song) in songs.iter().enumerate() {
            let token = format!("sb{:04}", position + 1);
            render_song(&mut body, &token, song, options.show_chords)?;
            anchors.push(Anchor { token, song: song.id.clone(), title: song.title.clone() });
        }
        let text = self.template.render(options.title_page.as_deref(), options.show_chords, &body)?;
        tracing::debug!(bytes = text.len(), "Assembled document");
        Ok(AssembledSource { text, anchors })
    }
}

fn render_song(out: &mut String, token: &str, song: &SongRecord, show_chords: bool) -> Result<()> {
    let invalid = |part: usize, line: usize, reason: String| {
        exn::Exn::from(ErrorKind::Template { song: song.id.clone(), part, line, reason })
    };
    let title = markup::plain(&song.title).map_err(|reason| invalid(0, 0, format!("title: {reason}")))?;
    let author = match song.author.as_deref() {
        Some(author) => markup::plain(author).map_err(|reason| invalid(0, 0, format!("author: {reason}")))?,
        None => String::new(),
    };
    // Writing to a String cannot fail.
    let _ = writeln!(out, "\\songanchor{{{token}}}");
    let _ = writeln!(out, "\\songtitle{{{title}}}{{{author}}}");

    let mut shift = 0;
    let mut verse = 0;
    for (part_index, part) in song.body.parts.iter().enumerate() {
        let (environment, label) = match &part.kind {
            PartKind::Verse => {
                verse += 1;
                ("songpart", format!("{verse}."))
            },
            PartKind::Chorus => ("songchorus", "Ref.".to_string()),
            PartKind::Bridge => ("songpart", "Bridge".to_string()),
            PartKind::Other(label) => (
                "songpart",
                markup::plain(label).map_err(|reason| invalid(part_index + 1, 0, format!("label: {reason}")))?,
            ),
        };
        let lines = render_part(part, &mut shift, show_chords)
            .map_err(|(line, reason)| invalid(part_index + 1, line, reason))?;
        if lines.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\\begin{{{environment}}}{{{label}}}");
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        let _ = writeln!(out, "\\end{{{environment}}}");
    }
    out.push_str("\\songend\n\n");
    Ok(())
}

/// Errors carry the 1-based line number.
fn render_part(part: &SongPart, shift: &mut i32, show_chords: bool) -> std::result::Result<Vec<String>, (usize, String)> {
    let mut lines = Vec::with_capacity(part.lines.len());
    for (index, line) in part.lines.iter().enumerate() {
        if let Some(rendered) = markup::render_line(line, shift, show_chords).map_err(|reason| (index + 1, reason))? {
            lines.push(rendered);
        }
    }
    // Blank lines around a part are the environment's job.
    while lines.last().is_some_and(|l| l == r"\songgap") {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| *l == r"\songgap").count();
    lines.drain(..leading);
    Ok(lines)
}
