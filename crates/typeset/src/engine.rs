use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs;
use tokio::process::Command;
use tracing::instrument;

/// Engines in order of preference. LuaLaTeX handles system fonts and UTF-8
/// lyrics without extra packages.
const ENGINES: [&str; 3] = ["lualatex", "xelatex", "pdflatex"];
const DEFAULT_ARGS: [&str; 4] = ["-interaction=nonstopmode", "-halt-on-error", "-file-line-error", "-no-shell-escape"];

/// What one engine invocation left behind.
#[derive(Debug, Clone)]
pub struct EngineRun {
    /// `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// The PDF, if one was written.
    pub output: Option<PathBuf>,
    pub log: String,
}

impl EngineRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A typesetting program.
///
/// Implementations turn a source file into a PDF inside `workdir`. They must
/// not touch anything outside it.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Typeset `source` (a file inside `workdir`) once.
    async fn run(&self, source: &Path, workdir: &Path) -> Result<EngineRun>;
}

pub type EngineHandle = Arc<dyn Engine>;

/// A LaTeX engine binary.
#[derive(Debug, Clone)]
pub struct LatexEngine {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl LatexEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "latex".to_string());
        Self { name, program, args: DEFAULT_ARGS.iter().map(|a| a.to_string()).collect() }
    }

    /// Find the first available engine on `PATH`.
    pub fn discover() -> Result<Self> {
        for exe in ENGINES {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(engine = %path.display(), "Discovered LaTeX engine");
                return Ok(Self::new(path));
            }
        }
        exn::bail!(ErrorKind::EngineNotFound(ENGINES.to_vec()));
    }

    /// Replace the default command line options. The source file name is
    /// always passed last.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Engine for LatexEngine {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(engine = %self.name))]
    async fn run(&self, source: &Path, workdir: &Path) -> Result<EngineRun> {
        let file_name = source.file_name().ok_or_raise(|| ErrorKind::Io)?;
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file_name)
            .current_dir(workdir)
            // Fixed timestamps and IDs, so identical input gives identical PDFs.
            .env("SOURCE_DATE_EPOCH", "0")
            .env("FORCE_SOURCE_DATE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (timeout) must not leave the engine running.
            .kill_on_drop(true)
            .output()
            .await
            .or_raise(|| ErrorKind::Io)?;

        let log_path = workdir.join(source.with_extension("log").file_name().unwrap_or(file_name));
        let log = match fs::read(&log_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            // Nothing on disk if the engine died early; stdout is the next best thing.
            Err(_) => format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        };
        let pdf_path = workdir.join(source.with_extension("pdf").file_name().unwrap_or(file_name));
        let output_pdf = fs::try_exists(&pdf_path).await.unwrap_or(false).then_some(pdf_path);
        tracing::debug!(exit_code = ?output.status.code(), pdf = output_pdf.is_some(), "Engine finished");
        Ok(EngineRun { exit_code: output.status.code(), output: output_pdf, log })
    }
}
