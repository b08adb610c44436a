//! Content-addressed disk cache for images referenced by documents.
//!
//! Entries are files named `sha256(src).ext`. There is no index: a file's presence is
//! its membership and its modification time is the eviction clock. Hits refresh the
//! mtime; a periodic sweep deletes entries older than the configured max age.
//!
//! Local sources are paths under the assets directory. They are copied in on every
//! render so that typst only ever reads from the cache directory.

use std::{
    collections::HashMap,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::try_join_all;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod detect;
mod download;

pub use detect::{detect_extension, placeholder_png};
pub use download::{Downloader, HttpDownloader, ResourceError, decode_data_url};

pub struct ImageCache {
    dir: PathBuf,
    assets: PathBuf,
    max_age: Duration,
    sequence: AtomicU64,
}

/// Hex SHA-256 of the URL, the stem of its cache file.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// `http`, `https` and `data:` sources. Everything else is a local path.
pub fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:")
}

/// Bumps the mtime of an entry. `false` if the entry is gone, e.g. swept since it was
/// listed.
fn refresh(path: &Path) -> io::Result<bool> {
    let file = match File::options().write(true).open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    file.set_modified(SystemTime::now())?;
    Ok(true)
}

fn find_entry(dir: &Path, key: &str) -> io::Result<Option<PathBuf>> {
    let pattern = format!("{}/{key}.*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths =
        glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    for path in paths.flatten() {
        if path.is_file() && refresh(&path)? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

impl ImageCache {
    pub async fn open(dir: impl Into<PathBuf>, max_age: Duration) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.inspect_err(
            |error| warn!(%error, dir = %dir.display(), "failed to create image cache"),
        )?;
        Ok(Self {
            dir,
            assets: PathBuf::from("."),
            max_age,
            sequence: AtomicU64::new(0),
        })
    }

    /// Directory relative local image paths are read from. Absolute paths are read
    /// as they are.
    pub fn with_assets_dir(mut self, assets: impl Into<PathBuf>) -> Self {
        self.assets = assets.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Finds the entry for `url` and refreshes its age on a hit.
    pub async fn lookup(&self, url: &str) -> io::Result<Option<PathBuf>> {
        let dir = self.dir.clone();
        let key = cache_key(url);
        tokio::task::spawn_blocking(move || find_entry(&dir, &key))
            .await
            .map_err(io::Error::other)?
    }

    /// Writes the entry through a hidden temporary file and renames it into place so
    /// concurrent readers never see a partial file.
    pub async fn store(&self, url: &str, ext: &str, body: &[u8]) -> io::Result<PathBuf> {
        let key = cache_key(url);
        let path = self.dir.join(format!("{key}.{ext}"));
        let tmp = self.dir.join(format!(
            ".tmp-{key}-{}-{}",
            std::process::id(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, body).await?;
        if let Err(error) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(error);
        }
        debug!(url, path = %path.display(), "stored image");
        Ok(path)
    }

    async fn fetch(
        &self,
        url: &str,
        downloader: &impl Downloader,
    ) -> Result<(Vec<u8>, &'static str), ResourceError> {
        let body = if url.starts_with("data:") {
            decode_data_url(url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            downloader.download(url).await?
        } else if url.contains("://") {
            return Err(ResourceError::Unsupported(url.to_owned()));
        } else {
            let path = self.assets.join(url);
            tokio::fs::read(&path)
                .await
                .map_err(|error| ResourceError::ReadLocal { path, error })?
        };
        let ext = detect_extension(&body)
            .ok_or_else(|| ResourceError::UnknownFormat(url.to_owned()))?;
        Ok((body, ext))
    }

    async fn resolve_one(&self, url: &str, downloader: &impl Downloader) -> io::Result<PathBuf> {
        // Local files may change between renders, so they are always copied again.
        if is_remote(url)
            && let Some(path) = self.lookup(url).await?
        {
            return Ok(path);
        }
        match self.fetch(url, downloader).await {
            Ok((body, ext)) => self.store(url, ext, &body).await,
            Err(error) => {
                warn!(%error, url, "image unavailable, caching placeholder");
                self.store(url, "png", placeholder_png()).await
            }
        }
    }

    /// Makes every source available in the cache directory and returns the cache file
    /// name for each of them. Unreachable or unreadable images become placeholders.
    pub async fn resolve_images<'a>(
        &self,
        urls: impl IntoIterator<Item = &'a str>,
        downloader: &impl Downloader,
    ) -> io::Result<HashMap<String, String>> {
        let tasks = urls.into_iter().map(|url| async move {
            let path = self.resolve_one(url, downloader).await?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok::<_, io::Error>((url.to_owned(), name))
        });
        Ok(try_join_all(tasks).await?.into_iter().collect())
    }

    /// Deletes every file older than the max age. Returns how many were removed.
    pub fn sweep(&self) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age > self.max_age {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => {
                        warn!(%error, path = %entry.path().display(), "failed to evict image")
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Runs [`Self::sweep`] every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let cache = self.clone();
                match tokio::task::spawn_blocking(move || cache.sweep()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(removed)) => info!(removed, "evicted cached images"),
                    Ok(Err(error)) => warn!(%error, "image cache sweep failed"),
                    Err(error) => warn!(%error, "image cache sweep panicked"),
                }
            }
        })
    }
}
