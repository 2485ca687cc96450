//! `hotswap follow`: a file-transport runtime that narrates reconciliation.
//!
//! Every followed module acts as a hot-swap boundary. Loading a chunk
//! re-attaches the boundaries it contains at the manifest's version, so
//! the context registry goes through the same supersede/collect cycle a
//! live process would.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use anyhow::{Context as _, Result, anyhow, bail};
use rustc_hash::FxHashSet;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use crate::cli::FollowArgs;
use crate::config::HotswapConfig;
use crate::context::ContextRegistry;
use crate::core;
use crate::driver::{
    ChunkLoader, DriverOptions, FileTransport, HotRuntime, LoadError, ReconciliationDriver,
    UpdateOutcome,
};
use crate::manifest::{Manifest, parse};
use crate::utils::path::{file_url, normalize_path};
use crate::{debug, log};

type Follower = ReconciliationDriver<FileTransport, Arc<BoundaryLoader>>;

/// Chunk loader that checks the chunk exists and re-attaches boundaries.
struct BoundaryLoader {
    driver: OnceLock<Weak<Follower>>,
    manifest: Url,
    /// Directory URL module paths are resolved against
    root: Url,
    boundaries: FxHashSet<String>,
    registry: Arc<ContextRegistry>,
}

impl BoundaryLoader {
    async fn load_chunk(&self, chunk: &Url) -> Result<(), LoadError> {
        let path = chunk
            .to_file_path()
            .map_err(|()| LoadError::new(chunk, "not a local file"))?;
        tokio::fs::metadata(&path)
            .await
            .map_err(|e| LoadError::new(chunk, e.to_string()))?;
        log!("driver"; "load {}", chunk);

        let Some(current) = self
            .driver
            .get()
            .and_then(Weak::upgrade)
            .and_then(|driver| driver.current(&self.manifest))
        else {
            return Ok(());
        };
        let modules = current
            .chunks
            .iter()
            .filter(|(url, _)| url == chunk)
            .flat_map(|(_, modules)| modules);
        for module in modules.filter(|m| self.boundaries.contains(*m)) {
            attach(&self.registry, &self.root, module, current.version);
        }
        Ok(())
    }
}

impl ChunkLoader for Arc<BoundaryLoader> {
    fn load(&self, chunk: &Url) -> impl Future<Output = Result<(), LoadError>> + Send {
        let this = Arc::clone(self);
        let chunk = chunk.clone();
        async move { this.load_chunk(&chunk).await }
    }
}

/// Create (or re-create) the context of boundary `id` at `version`.
fn attach(registry: &ContextRegistry, root: &Url, id: &str, version: u64) {
    let Ok(url) = root.join(id) else {
        debug!("context"; "cannot address module `{}`", id);
        return;
    };
    let context = registry.create(id, version, url);
    if context.version() != version {
        return;
    }

    let id = id.to_string();
    let installed = context.on_detach(move |next| {
        match next {
            Some(next) => log!("context"; "{} v{} -> v{}", id, version, next.version()),
            None => log!("context"; "{} v{} collected", id, version),
        }
        Ok(())
    });
    if let Err(e) = installed {
        debug!("context"; "{}", e);
    }
}

/// Manifest on disk right now, if any.
fn read_manifest(path: &Path) -> Option<Manifest> {
    let raw = std::fs::read(path).ok()?;
    match parse(&raw) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("manifest"; "{}: {}", path.display(), e);
            None
        }
    }
}

fn report(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Idle => {}
        UpdateOutcome::Applied {
            version,
            loaded,
            failed,
            collected,
        } => log!("manifest"; "v{} applied: {} loaded, {} failed, {} collected",
            version, loaded, failed, collected),
        UpdateOutcome::Superseded { version, .. } => {
            log!("manifest"; "v{} superseded before it finished loading", version)
        }
        UpdateOutcome::Reset { version, collected } => {
            log!("manifest"; "v{} requires a full reload ({} collected)", version, collected)
        }
    }
}

/// Entry point of the `follow` command.
pub async fn run(config: &HotswapConfig, args: &FollowArgs) -> Result<()> {
    let path: PathBuf = match &args.manifest {
        Some(path) => normalize_path(path),
        None => config.manifest_path(),
    };
    let manifest_url =
        file_url(&path).ok_or_else(|| anyhow!("cannot address `{}` as a file URL", path.display()))?;
    let root = Url::from_directory_path(&config.build.root)
        .map_err(|()| anyhow!("cannot address `{}` as a file URL", config.build.root.display()))?;

    let initial = read_manifest(&path);
    let boundaries: FxHashSet<String> = if args.hints.is_empty() {
        initial
            .iter()
            .flat_map(|m| m.modules().map(str::to_string))
            .collect()
    } else {
        args.hints.iter().cloned().collect()
    };
    if boundaries.is_empty() {
        bail!(
            "nothing to follow: pass --hint or publish `{}` first",
            path.display()
        );
    }
    let version = initial.as_ref().map_or(0, |m| m.version);

    let runtime = Arc::new(HotRuntime::new());
    let loader = Arc::new(BoundaryLoader {
        driver: OnceLock::new(),
        manifest: manifest_url.clone(),
        root: root.clone(),
        boundaries: boundaries.clone(),
        registry: Arc::clone(runtime.registry()),
    });
    let options = DriverOptions {
        retry_delay: config.watch.retry_delay(),
        bootstrap: None,
    };
    let driver = runtime.driver(FileTransport::new(), Arc::clone(&loader), options);
    let _ = loader.driver.set(Arc::downgrade(&driver));
    let mut outcomes = driver.subscribe();
    runtime.connect(driver.handle());

    let mut sorted: Vec<_> = boundaries.iter().collect();
    sorted.sort();
    for id in sorted {
        attach(runtime.registry(), &root, id, version);
        runtime.register(id, manifest_url.as_str(), &manifest_url);
    }

    let pulse = tokio::spawn({
        let runtime = Arc::clone(&runtime);
        async move { runtime.run().await }
    });
    let shutdown = core::on_shutdown();
    let mut shutdown = tokio::task::spawn_blocking(move || shutdown.recv());

    log!("watch"; "following {} ({} boundaries)", path.display(), boundaries.len());
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = outcomes.recv() => match received {
                Ok((_, outcome)) => {
                    report(&outcome);
                    if matches!(outcome, UpdateOutcome::Reset { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("driver"; "{} outcomes skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    runtime.shutdown();
    pulse.await.context("pulse loop panicked")?;
    Ok(())
}
