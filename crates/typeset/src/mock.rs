//! In-process stand-in for a LaTeX engine.
//!
//! [`MockEngine`] runs a closure instead of a program, counts how often it
//! was invoked, and can be told to hang or fail. [`pdf_with_pages`] builds
//! small but real PDFs for it to return.

use crate::engine::{Engine, EngineRun};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs;

/// What the mock engine is asked to typeset.
#[derive(Debug, Clone, Copy)]
pub struct MockInput<'a> {
    pub source: &'a str,
    /// Zero-based count of earlier invocations of this engine.
    pub invocation: usize,
}

/// What the mock engine leaves behind.
#[derive(Debug, Clone)]
pub struct MockOutput {
    pub exit_code: Option<i32>,
    pub pdf: Option<Vec<u8>>,
    pub log: String,
}

impl MockOutput {
    pub fn pdf(pdf: Vec<u8>, log: impl Into<String>) -> Self {
        Self { exit_code: Some(0), pdf: Some(pdf), log: log.into() }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self { exit_code: Some(1), pdf: None, log: log.into() }
    }
}

type Render = dyn Fn(MockInput<'_>) -> MockOutput + Send + Sync;

pub struct MockEngine {
    render: Arc<Render>,
    invocations: AtomicUsize,
    delay: Option<Duration>,
}

impl MockEngine {
    pub fn new(render: impl Fn(MockInput<'_>) -> MockOutput + Send + Sync + 'static) -> Self {
        Self { render: Arc::new(render), invocations: AtomicUsize::new(0), delay: None }
    }

    /// Always produces the same blank document with `pages` pages.
    pub fn pages(pages: usize) -> Self {
        Self::new(move |_| match pdf_with_pages(&vec![String::new(); pages]) {
            Ok(pdf) => MockOutput::pdf(pdf, format!("Output written on songbook.pdf ({pages} pages).")),
            Err(err) => MockOutput::failed(err.to_string()),
        })
    }

    /// Always fails with `log`.
    pub fn failing(log: impl Into<String>) -> Self {
        let log = log.into();
        Self::new(move |_| MockOutput::failed(log.clone()))
    }

    /// Sleep before every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never finish in any reasonable amount of time.
    pub fn hanging() -> Self {
        Self::pages(1).with_delay(Duration::from_secs(24 * 60 * 60))
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, source: &Path, workdir: &Path) -> Result<EngineRun> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let text = fs::read_to_string(source).await.or_raise(|| ErrorKind::Io)?;
        let rendered = (self.render)(MockInput { source: &text, invocation });

        let log_path = workdir.join(source.with_extension("log").file_name().unwrap_or_default());
        fs::write(&log_path, &rendered.log).await.or_raise(|| ErrorKind::Io)?;
        let output = match rendered.pdf {
            Some(pdf) => {
                let pdf_path = workdir.join(source.with_extension("pdf").file_name().unwrap_or_default());
                fs::write(&pdf_path, pdf).await.or_raise(|| ErrorKind::Io)?;
                Some(pdf_path)
            },
            None => None,
        };
        Ok(EngineRun { exit_code: rendered.exit_code, output, log: rendered.log })
    }
}

/// A real, minimal A4 PDF with one page per entry, each showing its text.
pub fn pdf_with_pages(pages: &[String]) -> lopdf::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::with_capacity(pages.len());
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
