//! The songbook build pipeline.
//!
//! A [`Songbook`] turns an ordered list of song ids into a published PDF:
//!
//! 1. [`select`] looks the songs up in a catalog, keeping request order.
//! 2. An [`Assembler`] renders them into one LaTeX document.
//! 3. The document is [fingerprinted](Fingerprint); if storage already holds
//!    a songbook with that fingerprint, its descriptor is returned as is.
//! 4. Otherwise a [`Compiler`](songbook_typeset::Compiler) typesets it,
//!    [`stamp`] adds page numbers, headers, badges and the index, and a
//!    [`Publisher`] uploads the result.
//!
//! Identical builds running at the same time share one compile: the second
//! waits for the first and then finds its artifact in storage.

mod assembler;
pub mod error;
mod fingerprint;
mod keys;
mod lock;
mod options;
mod publisher;
mod selector;
mod stamper;

pub use crate::assembler::{Anchor, AssembledSource, Assembler, BUILTIN_TEMPLATE, Builtins, DocumentTemplate};
pub use crate::fingerprint::Fingerprint;
pub use crate::keys::{ArtifactKey, DEFAULT_KEY_TEMPLATE, KeyGenerator};
pub use crate::lock::{KeyedGuard, KeyedMutex};
pub use crate::options::BuildOptions;
pub use crate::publisher::{ArtifactDescriptor, Publisher};
pub use crate::selector::select;
pub use crate::stamper::{IndexEntry, StampedDocument, stamp};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use songbook_catalog::{CatalogHandle, SongId};
use songbook_typeset::Compiler;
use tracing::instrument;

pub struct Songbook {
    catalog: CatalogHandle,
    assembler: Assembler,
    compiler: Compiler,
    publisher: Publisher,
    locks: KeyedMutex,
}

impl Songbook {
    /// A pipeline using the builtin document template.
    pub fn new(catalog: CatalogHandle, compiler: Compiler, publisher: Publisher) -> Result<Self> {
        Ok(Self {
            catalog,
            assembler: Assembler::new(DocumentTemplate::builtin()?),
            compiler,
            publisher,
            locks: KeyedMutex::new(),
        })
    }

    pub fn with_template(mut self, template: DocumentTemplate) -> Self {
        self.assembler = Assembler::new(template);
        self
    }

    /// The LaTeX source a build of `ids` would compile. Nothing is compiled
    /// or stored.
    pub async fn assemble(&self, ids: &[SongId], options: &BuildOptions) -> Result<AssembledSource> {
        let songs = select(self.catalog.as_ref(), ids).await?;
        self.assembler.assemble(&songs, options)
    }

    /// The fingerprint and storage key a build of `ids` would have.
    pub async fn fingerprint(&self, ids: &[SongId], options: &BuildOptions) -> Result<(Fingerprint, ArtifactKey)> {
        let source = self.assemble(ids, options).await?;
        let fingerprint = Fingerprint::compute(&source, options);
        let key = self.publisher.key(&fingerprint, options, source.anchors.len())?;
        Ok((fingerprint, key))
    }

    /// Build and publish a songbook, or find the one already published.
    #[instrument(skip_all, fields(songs = ids.len()))]
    pub async fn build(&self, ids: &[SongId], options: &BuildOptions) -> Result<ArtifactDescriptor> {
        let source = self.assemble(ids, options).await?;
        let fingerprint = Fingerprint::compute(&source, options);
        let key = self.publisher.key(&fingerprint, options, source.anchors.len())?;
        tracing::debug!(fingerprint = %fingerprint.short(), key = key.base(), "Assembled songbook");

        let _guard = self.locks.lock(fingerprint.as_str()).await;
        if let Some(descriptor) = self.publisher.lookup(&fingerprint, &key).await? {
            tracing::info!(fingerprint = %fingerprint.short(), "Songbook already published");
            return Ok(descriptor);
        }

        let compiled = self.compiler.compile(&source.text).await.map_err(ErrorKind::typeset)?;
        let anchors = source.anchors;
        let stamp_options = options.clone();
        let stamped = tokio::task::spawn_blocking(move || stamp(&compiled, &anchors, &stamp_options))
            .await
            .or_raise(|| ErrorKind::Pdf)??;
        self.publisher.publish(&fingerprint, &key, stamped).await
    }
}
