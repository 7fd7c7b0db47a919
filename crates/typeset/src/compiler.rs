//! Turning LaTeX source into a PDF.
//!
//! Each compile gets its own working directory, created fresh and removed
//! afterwards whether the compile succeeded, failed or ran out of time.
//! LaTeX needs several passes to settle cross-references; the engine is run
//! again while its log asks for that and the output keeps changing, up to a
//! fixed number of passes.

use crate::diagnostics;
use crate::engine::{EngineHandle, EngineRun};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::instrument;

const SOURCE_FILE: &str = "songbook.tex";
const WORKDIR_PREFIX: &str = "songbook-";

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Bound on the whole compile, all passes included.
    pub timeout: Duration,
    pub max_passes: u32,
    /// Where working directories are created. System temp dir when `None`.
    pub work_root: Option<PathBuf>,
    /// Files and directories copied into each working directory.
    pub assets: Vec<PathBuf>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), max_passes: 4, work_root: None, assets: Vec::new() }
    }
}

/// A typeset document, before stamping.
#[derive(Debug, Clone)]
pub struct CompiledDocument {
    pub pdf: Vec<u8>,
    pub pages: u32,
    /// Log of the final pass.
    pub log: String,
    pub passes: u32,
}

pub struct Compiler {
    engine: EngineHandle,
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(engine: EngineHandle, options: CompilerOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    #[instrument(skip_all, fields(engine = self.engine.name(), bytes = source.len()))]
    pub async fn compile(&self, source: &str) -> Result<CompiledDocument> {
        let workdir = self.workdir()?;
        let path = workdir.path().to_path_buf();
        let result = tokio::time::timeout(self.options.timeout, self.compile_in(&path, source)).await;
        // The engine future is gone by now; with it any child process.
        let cleanup = workdir.close();

        let document = match result {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => {
                Self::cleanup_failed(cleanup, &path).await;
                return Err(err);
            },
            Err(_) => {
                Self::cleanup_failed(cleanup, &path).await;
                exn::bail!(ErrorKind::Timeout(self.options.timeout));
            },
        };
        if cleanup.is_err() {
            // A killed engine can still hold files for a moment; try once more.
            fs::remove_dir_all(&path).await.or_raise(|| ErrorKind::Io)?;
        }
        tracing::info!(pages = document.pages, passes = document.passes, "Compiled document");
        Ok(document)
    }

    fn workdir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        match &self.options.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .or_raise(|| ErrorKind::Io)
    }

    async fn cleanup_failed(cleanup: std::io::Result<()>, path: &Path) {
        if cleanup.is_ok() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(path).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::error!(path = %path.display(), error = %err, "Could not remove working directory");
        }
    }

    async fn compile_in(&self, workdir: &Path, source: &str) -> Result<CompiledDocument> {
        self.stage_assets(workdir).await?;
        let source_path = workdir.join(SOURCE_FILE);
        fs::write(&source_path, source).await.or_raise(|| ErrorKind::Io)?;

        let mut previous = None;
        let mut passes = 0;
        loop {
            passes += 1;
            let run = self.engine.run(&source_path, workdir).await?;
            let pdf = Self::output_of(&run).await?;
            let hash = blake3::hash(&pdf);
            let settled = !diagnostics::wants_rerun(&run.log) || previous == Some(hash);
            if settled || passes >= self.options.max_passes {
                if !settled {
                    tracing::warn!(passes, "References still unsettled after the last allowed pass");
                }
                let pages = page_count(&pdf, &run.log)?;
                return Ok(CompiledDocument { pdf, pages, log: run.log, passes });
            }
            tracing::debug!(pass = passes, "Engine requested another pass");
            previous = Some(hash);
        }
    }

    async fn output_of(run: &EngineRun) -> Result<Vec<u8>> {
        if !run.succeeded() {
            exn::bail!(ErrorKind::Failed(diagnostics::excerpt(&run.log)));
        }
        let Some(path) = &run.output else {
            exn::bail!(ErrorKind::Failed(format!("no PDF was written\n{}", diagnostics::excerpt(&run.log))));
        };
        fs::read(path).await.or_raise(|| ErrorKind::Failed(diagnostics::excerpt(&run.log)))
    }

    /// Copy configured assets into the working directory, directories
    /// recursively under their own name.
    async fn stage_assets(&self, workdir: &Path) -> Result<()> {
        for asset in &self.options.assets {
            let metadata = fs::metadata(asset).await.or_raise(|| ErrorKind::AssetNotFound(asset.clone()))?;
            let Some(name) = asset.file_name() else {
                exn::bail!(ErrorKind::AssetNotFound(asset.clone()));
            };
            if metadata.is_dir() {
                copy_dir(asset, &workdir.join(name)).await?;
            } else {
                fs::copy(asset, workdir.join(name)).await.or_raise(|| ErrorKind::Io)?;
            }
        }
        Ok(())
    }
}

async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await.or_raise(|| ErrorKind::Io)?;
        let mut entries = fs::read_dir(&from).await.or_raise(|| ErrorKind::Io)?;
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io)? {
            let target = to.join(entry.file_name());
            if entry.file_type().await.or_raise(|| ErrorKind::Io)?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), target).await.or_raise(|| ErrorKind::Io)?;
            }
        }
    }
    Ok(())
}

fn page_count(pdf: &[u8], log: &str) -> Result<u32> {
    let doc = lopdf::Document::load_mem(pdf)
        .or_raise(|| ErrorKind::Failed(format!("output is not a readable PDF\n{}", diagnostics::excerpt(log))))?;
    u32::try_from(doc.get_pages().len()).or_raise(|| ErrorKind::Failed("implausible page count".to_string()))
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::mock::{MockEngine, MockOutput, pdf_with_pages};
    use std::sync::Arc;

    const RERUN: &str = "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.";

    fn options(root: &Path) -> CompilerOptions {
        CompilerOptions { work_root: Some(root.to_path_buf()), ..CompilerOptions::default() }
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_single_pass() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::pages(3));
        let compiler = Compiler::new(engine.clone(), options(root.path()));
        let document = compiler.compile("\\documentclass{article}").await.unwrap();
        assert_eq!(document.pages, 3);
        assert_eq!(document.passes, 1);
        assert_eq!(engine.invocations(), 1);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_reruns_until_output_is_stable() {
        let root = tempfile::tempdir().unwrap();
        // Asks for a rerun every time, but the second pass reproduces the first.
        let engine = Arc::new(MockEngine::new(|_| MockOutput::pdf(pdf_with_pages(&["x".to_string()]).unwrap(), RERUN)));
        let compiler = Compiler::new(engine.clone(), options(root.path()));
        let document = compiler.compile("src").await.unwrap();
        assert_eq!(document.passes, 2);
        assert_eq!(engine.invocations(), 2);
    }

    #[tokio::test]
    async fn test_reruns_while_requested() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(|input| {
            let pdf = pdf_with_pages(&[format!("pass {}", input.invocation)]).unwrap();
            MockOutput::pdf(pdf, if input.invocation < 2 { RERUN } else { "done" })
        }));
        let compiler = Compiler::new(engine.clone(), options(root.path()));
        let document = compiler.compile("src").await.unwrap();
        assert_eq!(document.passes, 3);
        assert_eq!(document.log, "done");
    }

    #[tokio::test]
    async fn test_pass_ceiling() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(|input| {
            MockOutput::pdf(pdf_with_pages(&[format!("pass {}", input.invocation)]).unwrap(), RERUN)
        }));
        let compiler =
            Compiler::new(engine.clone(), CompilerOptions { max_passes: 3, ..options(root.path()) });
        let document = compiler.compile("src").await.unwrap();
        assert_eq!(document.passes, 3);
        assert_eq!(engine.invocations(), 3);
    }

    #[tokio::test]
    async fn test_failure_carries_excerpt_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::failing("This is LuaTeX\n./songbook.tex:12: Undefined control sequence.\nl.12 \\foo"));
        let compiler = Compiler::new(engine, options(root.path()));
        let err = compiler.compile("src").await.unwrap_err();
        match &*err {
            ErrorKind::Failed(excerpt) => assert!(excerpt.contains("./songbook.tex:12: Undefined control sequence.")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_missing_output() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(|_| MockOutput { exit_code: Some(0), pdf: None, log: "odd".to_string() }));
        let err = Compiler::new(engine, options(root.path())).compile("src").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Failed(_)));
    }

    #[tokio::test]
    async fn test_unreadable_output() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(|_| MockOutput::pdf(b"not a pdf at all".to_vec(), "")));
        let err = Compiler::new(engine, options(root.path())).compile("src").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Failed(_)));
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::hanging());
        let compiler = Compiler::new(
            engine,
            CompilerOptions { timeout: Duration::from_millis(100), ..options(root.path()) },
        );
        let err = compiler.compile("src").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout(d) if *d == Duration::from_millis(100)));
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_assets_are_staged() {
        let root = tempfile::tempdir().unwrap();
        let assets = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(assets.path().join("fonts/extra")).unwrap();
        std::fs::write(assets.path().join("fonts/Poppins-Regular.ttf"), b"font").unwrap();
        std::fs::write(assets.path().join("fonts/extra/Poppins-Bold.ttf"), b"font").unwrap();
        std::fs::write(assets.path().join("logo.pdf"), b"logo").unwrap();

        let engine = Arc::new(MockEngine::new(|_| MockOutput::pdf(pdf_with_pages(&[String::new()]).unwrap(), "")));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = {
            let seen = seen.clone();
            Arc::new(StagingRecorder { inner: engine, seen })
        };
        let compiler = Compiler::new(
            recorder,
            CompilerOptions {
                assets: vec![assets.path().join("fonts"), assets.path().join("logo.pdf")],
                ..options(root.path())
            },
        );
        compiler.compile("src").await.unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&PathBuf::from("fonts/Poppins-Regular.ttf")));
        assert!(seen.contains(&PathBuf::from("fonts/extra/Poppins-Bold.ttf")));
        assert!(seen.contains(&PathBuf::from("logo.pdf")));
        assert!(seen.contains(&PathBuf::from(SOURCE_FILE)));
    }

    #[tokio::test]
    async fn test_missing_asset() {
        let root = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(
            Arc::new(MockEngine::pages(1)),
            CompilerOptions { assets: vec![root.path().join("nope.ttf")], ..CompilerOptions::default() },
        );
        let err = compiler.compile("src").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AssetNotFound(_)));
    }

    /// Records which files exist in the working directory when the engine starts.
    struct StagingRecorder {
        inner: Arc<MockEngine>,
        seen: Arc<std::sync::Mutex<Vec<PathBuf>>>,
    }

    #[async_trait::async_trait]
    impl crate::Engine for StagingRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn run(&self, source: &Path, workdir: &Path) -> Result<EngineRun> {
            let mut pending = vec![workdir.to_path_buf()];
            while let Some(dir) = pending.pop() {
                for entry in std::fs::read_dir(&dir).unwrap() {
                    let path = entry.unwrap().path();
                    if path.is_dir() {
                        pending.push(path);
                    } else {
                        self.seen.lock().unwrap().push(path.strip_prefix(workdir).unwrap().to_path_buf());
                    }
                }
            }
            self.inner.run(source, workdir).await
        }
    }
}
