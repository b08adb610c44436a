//! End-to-end renders against a fake typst and a temporary image cache.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use crate::{
    CompileError, Error, ResolutionError,
    compiler::{Defaults, ResolvedValues},
    config::{CompilerConfig, RendererConfig, ResolutionConfig},
    document::Document,
    image_cache::{Downloader, ImageCache, ResourceError, cache_key},
    injectable::{Definition, Engine, Registry, Request},
    renderer::{PdfCompiler, RenderRequest, Renderer},
    value::{InjectableValue, ValueType},
};

const PDF: &[u8] = b"%PDF-1.7 fake";

#[derive(Default)]
struct FakeTypst {
    delay: Duration,
    calls: AtomicUsize,
    markup: Mutex<Vec<String>>,
    roots: Mutex<Vec<PathBuf>>,
}

impl PdfCompiler for FakeTypst {
    async fn compile(&self, markup: &str, root: Option<&Path>) -> Result<Vec<u8>, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.markup.lock().unwrap().push(markup.to_owned());
        self.roots
            .lock()
            .unwrap()
            .extend(root.map(Path::to_path_buf));
        tokio::time::sleep(self.delay).await;
        Ok(PDF.to_vec())
    }
}

/// Every host is down.
struct Offline;

impl Downloader for Offline {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        Err(ResourceError::Status {
            url: url.to_owned(),
            status: reqwest::StatusCode::NOT_FOUND,
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    assets: tempfile::TempDir,
    renderer: Renderer<FakeTypst, Offline>,
}

impl Fixture {
    async fn new(slots: usize, acquire_timeout: Duration, delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let assets = tempfile::tempdir().unwrap();
        let cache = ImageCache::open(dir.path(), Duration::from_secs(3600))
            .await
            .unwrap()
            .with_assets_dir(assets.path());
        let config = RendererConfig {
            max_concurrent: slots,
            acquire_timeout,
            ..Default::default()
        };
        let compiler = FakeTypst {
            delay,
            ..Default::default()
        };
        let renderer = Renderer::new(
            &config,
            CompilerConfig::default(),
            Arc::new(cache),
            compiler,
            Offline,
        );
        Self {
            _dir: dir,
            assets,
            renderer,
        }
    }

    async fn with_injectables(definitions: Vec<Definition>) -> Self {
        let mut fixture = Self::new(1, Duration::from_secs(1), Duration::ZERO).await;
        let registry = Arc::new(Registry::new(definitions).unwrap());
        let engine = Engine::new(registry, &ResolutionConfig::default());
        fixture.renderer = fixture.renderer.with_engine(engine);
        fixture
    }

    fn compiler(&self) -> &FakeTypst {
        self.renderer.compiler()
    }

    fn last_markup(&self) -> String {
        self.compiler().markup.lock().unwrap().last().cloned().unwrap()
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.compiler().roots.lock().unwrap().clone()
    }
}

fn invoice(variables: &[&str], content: serde_json::Value) -> Document {
    let document = serde_json::json!({
        "meta": { "title": "Invoice 2024/001", "language": "en" },
        "variableIds": variables,
        "content": { "type": "doc", "content": content },
    });
    Document::from_json(&document.to_string()).unwrap()
}

fn injector(code: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "paragraph",
        "content": [
            { "type": "text", "text": "Bill to: " },
            { "type": "injector", "attrs": { "id": code } },
        ],
    })
}

fn request() -> RenderRequest {
    RenderRequest {
        document: invoice(&[], serde_json::json!([])),
        request: Request::default(),
    }
}

#[tokio::test]
async fn scalar_injector_renders_resolved_value() {
    let fixture = Fixture::with_injectables(vec![Definition::constant(
        "client_name",
        InjectableValue::from("Acme Corp"),
    )])
    .await;
    let rendered = fixture
        .renderer
        .render(
            RenderRequest {
                document: invoice(&["client_name"], serde_json::json!([injector("client_name")])),
                ..request()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(rendered.pdf, PDF);
    assert_eq!(rendered.filename, "Invoice 2024001.pdf");
    assert_eq!(rendered.page_count, 1);
    assert!(rendered.resolution_errors.is_empty());
    let markup = fixture.last_markup();
    assert!(markup.contains("Bill to: Acme Corp"), "{markup}");
    assert!(!markup.contains("client_name"), "{markup}");
}

#[tokio::test]
async fn missing_critical_injectable_aborts_without_pdf() {
    let fixture = Fixture::with_injectables(vec![
        Definition::new("invoice_number", ValueType::String, |_| async {
            Err(anyhow!("billing service unavailable"))
        })
        .critical(),
    ])
    .await;
    let error = fixture
        .renderer
        .render(
            RenderRequest {
                document: invoice(
                    &["invoice_number"],
                    serde_json::json!([injector("invoice_number")]),
                ),
                ..request()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(&error, Error::Resolution(ResolutionError::Critical { code, .. }) if code == "invoice_number"),
        "{error}"
    );
    assert!(error.to_string().contains("billing service unavailable"));
    assert_eq!(fixture.compiler().calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.renderer.slots().available(), Some(1));
}

#[tokio::test]
async fn failing_optional_injectable_falls_back_to_default() {
    let fixture = Fixture::with_injectables(vec![
        Definition::new("client_name", ValueType::String, |_| async {
            Err(anyhow!("crm timeout"))
        })
        .default_value("Valued customer"),
    ])
    .await;
    let rendered = fixture
        .renderer
        .render(
            RenderRequest {
                document: invoice(&["client_name"], serde_json::json!([injector("client_name")])),
                ..request()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(rendered.pdf, PDF);
    assert!(rendered.resolution_errors["client_name"].contains("crm timeout"));
    assert!(fixture.last_markup().contains("Bill to: Valued customer"));
}

#[tokio::test]
async fn broken_image_renders_with_cached_placeholder() {
    let fixture = Fixture::new(1, Duration::from_secs(1), Duration::ZERO).await;
    let url = "https://unreachable.invalid/logo.png";
    let document = invoice(
        &[],
        serde_json::json!([{ "type": "image", "attrs": { "src": url, "width": 120 } }]),
    );
    let rendered = fixture
        .renderer
        .render_preview(
            &document,
            &ResolvedValues::new(),
            &Defaults::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(rendered.pdf, PDF);

    let name = format!("{}.png", cache_key(url));
    let markup = fixture.last_markup();
    assert!(markup.contains(&format!("image(\"/{name}\"")), "{markup}");
    let root = fixture.roots()[0].clone();
    assert_eq!(root, fixture.renderer.cache().dir());

    let placeholder = image::load_from_memory(&std::fs::read(root.join(&name)).unwrap()).unwrap();
    assert_eq!((placeholder.width(), placeholder.height()), (1, 1));
}

#[tokio::test]
async fn local_images_are_staged_into_the_compile_root() {
    let fixture = Fixture::new(1, Duration::from_secs(1), Duration::ZERO).await;
    let logo = image::RgbImage::from_pixel(4, 2, image::Rgb([200, 10, 10]));
    std::fs::create_dir(fixture.assets.path().join("brand")).unwrap();
    logo.save(fixture.assets.path().join("brand/logo.png")).unwrap();
    let src = "brand/logo.png";
    let document = invoice(
        &[],
        serde_json::json!([
            { "type": "image", "attrs": { "src": src } },
            { "type": "paragraph", "content": [{ "type": "text", "text": src }] },
        ]),
    );
    fixture
        .renderer
        .render_preview(
            &document,
            &ResolvedValues::new(),
            &Defaults::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let name = format!("{}.png", cache_key(src));
    let markup = fixture.last_markup();
    assert!(markup.contains(&format!("#image(\"/{name}\")")), "{markup}");
    assert!(!markup.contains("image(\"brand"), "{markup}");
    assert!(markup.contains("brand\\/logo.png"), "{markup}");
    let root = fixture.roots()[0].clone();
    assert_eq!(root, fixture.renderer.cache().dir());
    let staged = image::open(root.join(&name)).unwrap();
    assert_eq!((staged.width(), staged.height()), (4, 2));
}

#[tokio::test]
async fn documents_without_images_compile_unrooted() {
    let fixture = Fixture::new(1, Duration::from_secs(1), Duration::ZERO).await;
    let document = invoice(
        &[],
        serde_json::json!([{ "type": "paragraph", "content": [{ "type": "text", "text": "hi" }] }]),
    );
    fixture
        .renderer
        .render_preview(
            &document,
            &ResolvedValues::new(),
            &Defaults::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(fixture.compiler().calls.load(Ordering::SeqCst), 1);
    assert!(fixture.roots().is_empty());
}

#[tokio::test]
async fn second_render_is_busy_while_the_only_slot_is_held() {
    let fixture = Fixture::new(1, Duration::from_millis(50), Duration::from_millis(500)).await;
    let document = invoice(&[], serde_json::json!([{ "type": "paragraph" }]));
    let cancel = CancellationToken::new();
    let values = ResolvedValues::new();
    let defaults = Defaults::new();
    let render = || {
        fixture
            .renderer
            .render_preview(&document, &values, &defaults, &cancel)
    };

    let (first, second) = tokio::join!(render(), render());
    assert!(first.is_ok());
    let error = second.unwrap_err();
    assert!(matches!(error, Error::RendererBusy { .. }), "{error}");
    assert!(error.is_retryable());
    assert_eq!(fixture.compiler().calls.load(Ordering::SeqCst), 1);

    // the slot came back
    assert_eq!(fixture.renderer.slots().available(), Some(1));
    assert!(render().await.is_ok());
}

#[tokio::test]
async fn cancelled_render_reports_cancellation() {
    let fixture = Fixture::new(1, Duration::from_secs(1), Duration::from_secs(60)).await;
    let document = invoice(&[], serde_json::json!([]));
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let error = fixture
        .renderer
        .render_preview(&document, &ResolvedValues::new(), &Defaults::new(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Cancelled));
    assert_eq!(fixture.renderer.slots().available(), Some(1));
}

#[tokio::test]
async fn invalid_documents_are_rejected_before_compiling() {
    let fixture = Fixture::new(1, Duration::from_secs(1), Duration::ZERO).await;
    let mut document = invoice(&[], serde_json::json!([]));
    document.content.content.push(crate::document::Node {
        text: None,
        ..crate::document::Node::text("")
    });
    let error = fixture
        .renderer
        .render_preview(
            &document,
            &ResolvedValues::new(),
            &Defaults::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Configuration(_)));
    assert_eq!(fixture.compiler().calls.load(Ordering::SeqCst), 0);
}
