use clap::{Args, Parser, Subcommand};
use songbook_build::BuildOptions;
use songbook_catalog::SongId;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "songbook", version, about = "Build paginated, indexed songbooks from a song catalog")]
pub struct Cli {
    /// Config file (TOML, YAML or JSON). Defaults to the user config directory.
    #[arg(short, long, global = true, env = "SONGBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// More logging; repeat for more. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build and publish a songbook, printing its descriptor as JSON.
    Build(Selection),
    /// Print the LaTeX source a build would compile.
    Assemble(Selection),
    /// Print the fingerprint and storage key a build would have.
    Fingerprint(Selection),
}

impl Command {
    pub fn selection(&self) -> &Selection {
        match self {
            Self::Build(selection) | Self::Assemble(selection) | Self::Fingerprint(selection) => selection,
        }
    }
}

#[derive(Debug, Args)]
pub struct Selection {
    /// Song ids, in songbook order. Repeats are allowed.
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Leave out the index pages.
    #[arg(long)]
    pub no_index: bool,

    /// Leave out page numbers and running headers.
    #[arg(long)]
    pub no_page_numbers: bool,

    /// Text for a title page in front of the first song.
    #[arg(long)]
    pub title: Option<String>,

    /// Leave out chords.
    #[arg(long)]
    pub lyrics_only: bool,

    /// Stamp each song's id onto its first page.
    #[arg(long)]
    pub badges: bool,

    #[arg(long, default_value = "Index")]
    pub index_heading: String,
}

impl Selection {
    pub fn ids(&self) -> Vec<SongId> {
        self.ids.iter().map(|id| SongId::new(id.trim())).collect()
    }

    pub fn options(&self) -> BuildOptions {
        BuildOptions {
            include_index: !self.no_index,
            page_numbering: !self.no_page_numbers,
            title_page: self.title.clone().filter(|t| !t.trim().is_empty()),
            show_chords: !self.lyrics_only,
            song_id_badges: self.badges,
            index_heading: self.index_heading.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_build_options() {
        let cli = Cli::try_parse_from(["songbook", "build", "A-001", "B-001", "A-001"]).unwrap();
        let selection = cli.command.selection();
        assert_eq!(selection.options(), BuildOptions::default());
        assert_eq!(selection.ids(), vec![SongId::from("A-001"), SongId::from("B-001"), SongId::from("A-001")]);
        assert!(matches!(cli.command, Command::Build(_)));
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "songbook",
            "-vv",
            "assemble",
            "A-001",
            "--no-index",
            "--no-page-numbers",
            "--title",
            "Letný tábor",
            "--lyrics-only",
            "--badges",
            "--index-heading",
            "Obsah",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Assemble(_)));
        let options = cli.command.selection().options();
        assert!(!options.include_index);
        assert!(!options.page_numbering);
        assert_eq!(options.title_page.as_deref(), Some("Letný tábor"));
        assert!(!options.show_chords);
        assert!(options.song_id_badges);
        assert_eq!(options.index_heading, "Obsah");
    }

    #[rstest]
    #[case(&["songbook", "build"])]
    #[case(&["songbook", "publish", "A-001"])]
    fn test_rejects(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_blank_title_means_no_title_page() {
        let cli = Cli::try_parse_from(["songbook", "fingerprint", "A-001", "--title", "  "]).unwrap();
        assert_eq!(cli.command.selection().options().title_page, None);
    }
}
