//! Manifest transports.
//!
//! A transport answers two questions about a manifest URL: what it holds
//! right now, and what it holds after the next change. Drivers build a
//! watch loop on top of these (see [`super::watch`]).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported source `{0}`")]
    Unsupported(Url),

    #[error("cannot read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot watch `{path}`: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("change feed for `{0}` closed")]
    Closed(Url),
}

/// Source of manifest bytes.
pub trait Transport: Send + Sync + 'static {
    /// Whether `url` can be served at all.
    fn supports(&self, url: &Url) -> bool;

    /// Manifest bytes as they are now.
    fn fetch_latest(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Manifest bytes after the next change signal.
    ///
    /// Changes that happened since the previous `fetch_latest`/`observe`
    /// for the same URL resolve immediately.
    fn observe(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Drop any listener kept for `url`.
    fn release(&self, _url: &Url) {}
}

// =============================================================================
// FileTransport
// =============================================================================

/// Change feed of one manifest file.
struct FileFeed {
    /// Watcher handle (must be kept alive)
    _watcher: RecommendedWatcher,
    /// Change counter; the receiver remembers what was already observed
    changes: Mutex<watch::Receiver<u64>>,
}

/// `file:` manifests, change signals from `notify`.
#[derive(Default)]
pub struct FileTransport {
    feeds: DashMap<PathBuf, Arc<FileFeed>>,
}

impl FileTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_of(url: &Url) -> Result<PathBuf, TransportError> {
        if url.scheme() != "file" {
            return Err(TransportError::Unsupported(url.clone()));
        }
        url.to_file_path()
            .map_err(|()| TransportError::Unsupported(url.clone()))
    }

    /// Feed for `path`, starting the directory watcher on first use.
    fn feed(&self, path: &Path) -> Result<Arc<FileFeed>, TransportError> {
        if let Some(feed) = self.feeds.get(path) {
            return Ok(Arc::clone(&feed));
        }

        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(|source| TransportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let (tx, rx) = watch::channel(0u64);
        let name = path.file_name().map(|name| name.to_os_string());
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            // Ignore metadata-only changes
            if matches!(
                event.kind,
                notify::EventKind::Modify(notify::event::ModifyKind::Metadata(_))
                    | notify::EventKind::Access(_)
            ) {
                return;
            }
            let touches = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == name);
            if touches {
                tx.send_modify(|n| *n += 1);
            }
        })
        .map_err(|source| TransportError::Watch {
            path: dir.to_path_buf(),
            source,
        })?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| TransportError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        let feed = Arc::new(FileFeed {
            _watcher: watcher,
            changes: Mutex::new(rx),
        });
        // Another caller may have raced us; keep whichever landed first
        Ok(Arc::clone(&self.feeds.entry(path.to_path_buf()).or_insert(feed)))
    }

    async fn read(path: &Path) -> Result<Vec<u8>, TransportError> {
        tokio::fs::read(path).await.map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Transport for FileTransport {
    fn supports(&self, url: &Url) -> bool {
        url.scheme() == "file"
    }

    fn fetch_latest(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let prepared = Self::path_of(url).and_then(|path| {
            self.feed(&path)?;
            Ok(path)
        });
        async move { Self::read(&prepared?).await }
    }

    fn observe(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let prepared =
            Self::path_of(url).and_then(|path| self.feed(&path).map(|feed| (path, feed)));
        let url = url.clone();
        async move {
            let (path, feed) = prepared?;
            {
                let mut changes = feed.changes.lock().await;
                changes
                    .changed()
                    .await
                    .map_err(|_| TransportError::Closed(url))?;
            }
            Self::read(&path).await
        }
    }

    fn release(&self, url: &Url) {
        if let Ok(path) = url.to_file_path() {
            self.feeds.remove(&path);
        }
    }
}
