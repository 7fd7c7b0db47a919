//! The LaTeX document the songs are poured into.
//!
//! Templates are rendered with [upon], using `<< expr >>`, `<% block %>` and
//! `<# comment #>` delimiters so that LaTeX's own braces need no quoting.
//! The `tex` formatter escapes a value for LaTeX body text.
//!
//! # Template Variables
//!
//! | Variable      | Type             | Description                                   |
//! |---------------|------------------|-----------------------------------------------|
//! | `title`       | `Option<String>` | Title page text, unescaped                    |
//! | `show_chords` | `bool`           | Whether chords are typeset                    |
//! | `body`        | `String`         | The rendered songs, ready to paste verbatim   |
//!
//! A template must define the macros the body uses: `\songanchor`,
//! `\songtitle`, `\songline`, `\chordline`, `\ch`, `\songgap`, `\songend`
//! and the `songpart` and `songchorus` environments. `\songanchor` has to
//! write `SONGBOOK-ANCHOR:<token>:<physical page>` to the log when its page
//! is shipped out; the stamper finds song pages that way.

use super::escape::escape;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use rust_embed::Embed;
use std::borrow::Cow;
use std::fmt::Write;
use std::path::Path;
use std::str::FromStr;
use upon::{Engine, Syntax, Template, Value, fmt as upon_fmt};

pub const BUILTIN_TEMPLATE: &str = "songbook.tex";

#[derive(Embed)]
#[folder = "../../assets/templates/"]
pub struct Builtins;
impl Builtins {
    /// Get the content of a builtin document template by name.
    pub fn load(name: impl AsRef<str>) -> Result<Cow<'static, [u8]>> {
        Self::get(name.as_ref())
            .map(|f| f.data)
            .ok_or_raise(|| ErrorKind::Document(format!("no builtin template named {}", name.as_ref())))
    }

    /// List all available builtin template names.
    pub fn list() -> Vec<Cow<'static, str>> {
        Self::iter().filter(|f| f.ends_with(".tex")).collect()
    }

    pub fn exists(name: impl AsRef<str>) -> bool {
        Self::get(name.as_ref()).is_some()
    }
}

pub struct DocumentTemplate {
    engine: Engine<'static>,
    template: Template<'static>,
}

impl FromStr for DocumentTemplate {
    type Err = crate::error::Error;

    /// Compile a template eagerly, so syntax errors surface here rather than
    /// halfway through a build.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let syntax = Syntax::builder().expr("<<", ">>").block("<%", "%>").comment("<#", "#>").build();
        let mut engine = Engine::with_syntax(syntax);
        engine.add_formatter("tex", tex_formatter);
        let template = engine
            .compile(s.to_string())
            .or_raise(|| ErrorKind::Document("template does not compile".to_string()))?;
        Ok(Self { engine, template })
    }
}

impl DocumentTemplate {
    pub fn builtin() -> Result<Self> {
        Self::from_builtin(BUILTIN_TEMPLATE)
    }

    pub fn from_builtin(name: impl AsRef<str>) -> Result<Self> {
        let data = Builtins::load(name.as_ref())?;
        std::str::from_utf8(&data)
            .or_raise(|| ErrorKind::Document(format!("builtin template {} is not UTF-8", name.as_ref())))?
            .parse()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .or_raise(|| ErrorKind::Document(format!("cannot read {}", path.display())))?
            .parse()
    }

    pub(crate) fn render(&self, title: Option<&str>, show_chords: bool, body: &str) -> Result<String> {
        self.template
            .render(
                &self.engine,
                upon::value! {
                    title: title,
                    show_chords: show_chords,
                    body: body,
                },
            )
            .to_string()
            .or_raise(|| ErrorKind::Document("template does not render".to_string()))
    }
}

fn tex_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
    match value {
        Value::String(s) => f.write_str(&escape(s))?,
        v => upon_fmt::default(f, v)?,
    };
    Ok(())
}
