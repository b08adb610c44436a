//! Turns documents into PDFs: resolve injectables, compile to markup, fetch images,
//! run typst inside a bounded number of slots.

use std::sync::Arc;

use derive_debug::Dbg;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    CompileError, Error,
    compiler::{Builder, Defaults, ResolvedValues},
    config::{CompilerConfig, RendererConfig},
    document::Document,
    image_cache::{Downloader, HttpDownloader, ImageCache},
    injectable::{Engine, Request},
};

mod slots;
mod typst;

pub use slots::{Slot, SlotPool};
pub use typst::{PdfCompiler, Typst};

const FALLBACK_BASENAME: &str = "document";

/// File name for a rendered document: the title restricted to ASCII letters,
/// digits, spaces, hyphens and underscores, plus `.pdf`.
pub fn output_filename(title: &str) -> String {
    let kept = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>();
    let basename = match kept.trim() {
        "" => FALLBACK_BASENAME,
        trimmed => trimmed,
    };
    format!("{basename}.pdf")
}

#[derive(Dbg)]
pub struct Rendered {
    #[dbg(skip)]
    pub pdf: Vec<u8>,
    pub filename: String,
    pub page_count: usize,
    /// Non-critical injectables that fell back, by code.
    pub resolution_errors: IndexMap<String, String>,
}

/// A document to render along with the request its injectables resolve against.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document: Document,
    pub request: Request,
}

pub struct Renderer<C = Typst, D = HttpDownloader> {
    slots: SlotPool,
    compiler: C,
    downloader: D,
    cache: Arc<ImageCache>,
    config: CompilerConfig,
    engine: Option<Engine>,
}

impl<C: PdfCompiler, D: Downloader> Renderer<C, D> {
    pub fn new(
        renderer: &RendererConfig,
        compiler_config: CompilerConfig,
        cache: Arc<ImageCache>,
        compiler: C,
        downloader: D,
    ) -> Self {
        Self {
            slots: SlotPool::new(renderer.max_concurrent, renderer.acquire_timeout),
            compiler,
            downloader,
            cache,
            config: compiler_config,
            engine: None,
        }
    }

    /// Enables [`Self::render`].
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Renders a document whose injectables are already resolved.
    pub async fn render_preview(
        &self,
        document: &Document,
        values: &ResolvedValues,
        defaults: &Defaults,
        cancel: &CancellationToken,
    ) -> Result<Rendered, Error> {
        document.validate()?;
        let _slot = self.slots.acquire(cancel).await?;
        self.compile(document, values, defaults, cancel).await
    }

    /// Resolves the document's injectables for `request`, then renders it. A failing
    /// critical injectable aborts before anything is compiled.
    pub async fn render(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<Rendered, Error> {
        let RenderRequest { document, request } = request;
        document.validate()?;
        let _slot = self.slots.acquire(cancel).await?;
        let (values, defaults, errors) = match &self.engine {
            Some(engine) => {
                let resolution = engine
                    .resolve(&document.variable_ids, Arc::new(request), cancel)
                    .await?;
                let mut defaults = engine.registry().defaults();
                defaults.extend(resolution.defaults);
                (resolution.values, defaults, resolution.errors)
            }
            None => Default::default(),
        };
        let mut rendered = self.compile(&document, &values, &defaults, cancel).await?;
        rendered.resolution_errors = errors;
        Ok(rendered)
    }

    /// Markup, images and typst. Runs while the caller holds a slot.
    async fn compile(
        &self,
        document: &Document,
        values: &ResolvedValues,
        defaults: &Defaults,
        cancel: &CancellationToken,
    ) -> Result<Rendered, Error> {
        let builder = Builder::new(&self.config, defaults);
        let compiled = builder.build(document, values);
        // Without images typst runs unrooted; with them it reads only from the cache.
        let (compiled, root) = if compiled.images.is_empty() {
            (compiled, None)
        } else {
            let staged = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                staged = self
                    .cache
                    .resolve_images(compiled.images.iter(), &self.downloader) => {
                    staged.map_err(CompileError::Images)?
                }
            };
            debug!(images = staged.len(), "images ready");
            let compiled = builder.with_images(&staged).build(document, values);
            (compiled, Some(self.cache.dir()))
        };

        let pdf = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            pdf = self.compiler.compile(&compiled.markup, root) => pdf?,
        };
        let filename = output_filename(&document.meta.title);
        info!(
            %filename,
            page_count = compiled.page_count,
            bytes = pdf.len(),
            "rendered document"
        );
        Ok(Rendered {
            pdf,
            filename,
            page_count: compiled.page_count,
            resolution_errors: IndexMap::new(),
        })
    }
}
