use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use docrender::{
    Document, Renderer,
    compiler::{Defaults, ResolvedValues},
    config::Config,
    image_cache::{HttpDownloader, ImageCache},
    renderer::Typst,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "DOCRENDER_CONFIG")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a document JSON file to PDF.
    Render {
        document: PathBuf,
        /// JSON object of pre-resolved injectable values keyed by code.
        #[clap(long)]
        values: Option<PathBuf>,
        /// Defaults to the file name derived from the document title.
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
    /// Evict expired entries from the image cache once.
    Sweep,
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let src = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read config from {}", path.display()))?;
    Config::from_yaml(&src).with_context(|| format!("parse config from {}", path.display()))
}

async fn render(
    config: Config,
    document: PathBuf,
    values: Option<PathBuf>,
    out: Option<PathBuf>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let src = tokio::fs::read_to_string(&document)
        .await
        .with_context(|| format!("read document from {}", document.display()))?;
    let document = Document::from_json(&src)?;
    let values: ResolvedValues = match values {
        Some(path) => {
            let src = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("read values from {}", path.display()))?;
            serde_json::from_str(&src)
                .with_context(|| format!("parse values from {}", path.display()))?
        }
        None => ResolvedValues::new(),
    };

    let cache = ImageCache::open(&config.image_cache.dir, config.image_cache.max_age)
        .await
        .context("open image cache")?
        .with_assets_dir(&config.image_cache.assets_dir);
    let downloader = HttpDownloader::new(config.image_cache.download_timeout)
        .context("build http client")?;
    let renderer = Renderer::new(
        &config.renderer,
        config.compiler.clone(),
        Arc::new(cache),
        Typst::new(&config.renderer),
        downloader,
    );
    let rendered = renderer
        .render_preview(&document, &values, &Defaults::new(), &cancel)
        .await?;
    let out = out.unwrap_or_else(|| PathBuf::from(&rendered.filename));
    tokio::fs::write(&out, &rendered.pdf)
        .await
        .with_context(|| format!("write {}", out.display()))?;
    info!(out = %out.display(), page_count = rendered.page_count, "wrote pdf");
    Ok(())
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = load_config(opts.config.as_ref()).await?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    match opts.command {
        Command::Render {
            document,
            values,
            out,
        } => render(config, document, values, out, cancel).await,
        Command::Sweep => {
            let cache = ImageCache::open(&config.image_cache.dir, config.image_cache.max_age)
                .await
                .context("open image cache")?;
            let removed = tokio::task::spawn_blocking(move || cache.sweep()).await??;
            info!(removed, "swept image cache");
            Ok(())
        }
    }
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(opts)) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
