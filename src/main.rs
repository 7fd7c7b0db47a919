//! `songbook`: build songbooks from the command line.
//!
//! ```text
//! songbook build A-001 B-014 C-003 --title "Letný tábor"
//! songbook assemble A-001 --lyrics-only > songbook.tex
//! songbook fingerprint A-001 B-014
//! ```

mod cli;
mod error;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use songbook_build::{
    AssembledSource, Assembler, BuildOptions, DocumentTemplate, Fingerprint, KeyGenerator, Publisher, Songbook, select,
};
use songbook_catalog::{CatalogHandle, JsonCatalog, SongId, SqliteCatalog};
use songbook_config::{CatalogConfig, Config, EngineConfig, StorageConfig};
use songbook_storage::BackendHandle;
use songbook_storage::backend::LocalBackend;
use songbook_typeset::{Compiler, CompilerOptions, LatexEngine};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Logs go to stderr; stdout is the command's output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(|err| err.raise(ErrorKind::Config))?;
    let selection = cli.command.selection();
    let (ids, options) = (selection.ids(), selection.options());

    let output = match &cli.command {
        Command::Build(_) => {
            let songbook = songbook(&config).await?;
            let descriptor = songbook.build(&ids, &options).await.map_err(|err| err.raise(ErrorKind::Build))?;
            let mut json = serde_json::to_string_pretty(&descriptor).or_raise(|| ErrorKind::Output)?;
            json.push('\n');
            json
        },
        Command::Assemble(_) => {
            let preview = Preview::new(&config).await?;
            preview.source(&ids, &options).await.map_err(|err| err.raise(ErrorKind::Build))?.text
        },
        Command::Fingerprint(_) => {
            let preview = Preview::new(&config).await?;
            let source = preview.source(&ids, &options).await.map_err(|err| err.raise(ErrorKind::Build))?;
            let fingerprint = Fingerprint::compute(&source, &options);
            let key = preview
                .keys
                .generate(&fingerprint, &options, source.anchors.len())
                .map_err(|err| err.raise(ErrorKind::Build))?;
            format!("{fingerprint}\t{}\n", key.pdf().display())
        },
    };
    std::io::stdout().lock().write_all(output.as_bytes()).or_raise(|| ErrorKind::Output)
}

async fn songbook(config: &Config) -> Result<Songbook> {
    let catalog = catalog(&config.catalog).await?;
    let backend = storage(&config.storage).await?;
    let compiler = Compiler::new(Arc::new(engine(&config.engine)?), compiler_options(&config.engine));
    let songbook = Songbook::new(catalog, compiler, Publisher::new(backend, keys(config)?))
        .map_err(|err| err.raise(ErrorKind::Template))?;
    Ok(songbook.with_template(template(config)?))
}

/// What `assemble` and `fingerprint` run on. Neither touches the engine or
/// storage, so neither is set up.
struct Preview {
    catalog: CatalogHandle,
    assembler: Assembler,
    keys: KeyGenerator,
}

impl Preview {
    async fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            catalog: catalog(&config.catalog).await?,
            assembler: Assembler::new(template(config)?),
            keys: keys(config)?,
        })
    }

    async fn source(&self, ids: &[SongId], options: &BuildOptions) -> songbook_build::error::Result<AssembledSource> {
        let songs = select(self.catalog.as_ref(), ids).await?;
        self.assembler.assemble(&songs, options)
    }
}

fn template(config: &Config) -> Result<DocumentTemplate> {
    match &config.document.template {
        Some(path) => DocumentTemplate::from_file(path),
        None => DocumentTemplate::builtin(),
    }
    .map_err(|err| err.raise(ErrorKind::Template))
}

fn keys(config: &Config) -> Result<KeyGenerator> {
    match &config.document.key_template {
        Some(template) => template.parse::<KeyGenerator>().map_err(|err| err.raise(ErrorKind::Config)),
        None => Ok(KeyGenerator::default()),
    }
}

async fn catalog(config: &CatalogConfig) -> Result<CatalogHandle> {
    let catalog: CatalogHandle = match config {
        CatalogConfig::Sqlite { path } => {
            Arc::new(SqliteCatalog::open(path).await.map_err(|err| err.raise(ErrorKind::Catalog))?)
        },
        CatalogConfig::Json { dir } => {
            Arc::new(JsonCatalog::open(dir).await.map_err(|err| err.raise(ErrorKind::Catalog))?)
        },
    };
    Ok(catalog)
}

async fn storage(config: &StorageConfig) -> Result<BackendHandle> {
    let backend: BackendHandle = match config {
        StorageConfig::Local { path } => {
            Arc::new(LocalBackend::new("local", path).map_err(|err| err.raise(ErrorKind::Storage))?)
        },
        #[cfg(feature = "s3")]
        StorageConfig::S3 { bucket, prefix, region, endpoint, key_id, key_secret } => Arc::new(
            songbook_storage::backend::S3Backend::new(
                "s3",
                bucket,
                prefix.clone(),
                region,
                endpoint.clone(),
                key_id,
                key_secret,
            )
            .await
            .map_err(|err| err.raise(ErrorKind::Storage))?,
        ),
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3 { .. } => {
            tracing::error!("S3 storage is configured, but this build has no S3 support");
            exn::bail!(ErrorKind::Storage);
        },
    };
    Ok(backend)
}

fn engine(config: &EngineConfig) -> Result<LatexEngine> {
    let engine = match &config.program {
        Some(program) => LatexEngine::new(program),
        None => LatexEngine::discover().map_err(|err| err.raise(ErrorKind::Engine))?,
    };
    Ok(match &config.args {
        Some(args) => engine.with_args(args.iter().cloned()),
        None => engine,
    })
}

fn compiler_options(config: &EngineConfig) -> CompilerOptions {
    CompilerOptions {
        timeout: config.timeout(),
        max_passes: config.max_passes,
        work_root: config.work_root.clone(),
        assets: config.assets.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[test]
    fn test_engine_from_config() {
        let config = EngineConfig {
            program: Some(PathBuf::from("/opt/texlive/bin/xelatex")),
            args: Some(vec!["-interaction=batchmode".to_string()]),
            ..EngineConfig::default()
        };
        let engine = engine(&config).unwrap();
        assert_eq!(engine.program(), Path::new("/opt/texlive/bin/xelatex"));
    }

    #[test]
    fn test_compiler_options_from_config() {
        let config = EngineConfig {
            timeout_secs: 45,
            max_passes: 2,
            work_root: Some(PathBuf::from("/var/tmp/songbook")),
            assets: vec![PathBuf::from("/srv/fonts")],
            ..EngineConfig::default()
        };
        let options = compiler_options(&config);
        assert_eq!(options.timeout, Duration::from_secs(45));
        assert_eq!(options.max_passes, 2);
        assert_eq!(options.work_root, config.work_root);
        assert_eq!(options.assets, config.assets);
    }

    #[tokio::test]
    async fn test_local_storage_and_json_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let backend = storage(&StorageConfig::Local { path: dir.path().join("published") }).await.unwrap();
        assert_eq!(backend.name(), "local");
        assert!(dir.path().join("published").is_dir());

        std::fs::create_dir(dir.path().join("songs")).unwrap();
        assert!(catalog(&CatalogConfig::Json { dir: dir.path().join("songs") }).await.is_ok());
    }

    #[tokio::test]
    async fn test_preview_sets_up_no_storage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("songs")).unwrap();
        std::fs::write(
            dir.path().join("songs/A-001.json"),
            r#"{"song_id": "A-001", "title": "Aleluja", "song_parts": [{"type": "sloha", "lines": ["[G]Aleluja"]}]}"#,
        )
        .unwrap();
        let config = Config {
            catalog: CatalogConfig::Json { dir: dir.path().join("songs") },
            storage: StorageConfig::Local { path: dir.path().join("published") },
            engine: EngineConfig { program: Some(PathBuf::from("/nonexistent/lualatex")), ..EngineConfig::default() },
            ..Config::default()
        };

        let preview = Preview::new(&config).await.unwrap();
        let options = BuildOptions::default();
        let source = preview.source(&[SongId::from("A-001")], &options).await.unwrap();
        assert!(source.text.contains(r"\songtitle{Aleluja}"));
        let key = preview.keys.generate(&Fingerprint::compute(&source, &options), &options, 1).unwrap();
        assert!(key.base().starts_with("songbooks/"));
        assert!(!dir.path().join("published").exists());
    }

    #[tokio::test]
    async fn test_relative_storage_root_is_rejected() {
        let err = storage(&StorageConfig::Local { path: PathBuf::from("published") }).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Storage));
    }
}
