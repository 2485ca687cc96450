//! Runtime-side reconciliation of published manifests.
//!
//! A [`ReconciliationDriver`] watches every manifest URL present in the
//! hint table, validates what arrives, reloads chunks that live boundaries
//! depend on and collects contexts whose module left the build.
//!
//! # Flow
//!
//! ```text
//! Watch ──> tap() ──validate──> accept ──> current (ArcSwap) ──> update loop
//!                     │                                          │
//!                     └─ Rejection (silent)        load spawn set, then gc
//! ```
//!
//! # Modules
//!
//! - `hints` - manifest URL → live module paths
//! - `transport` - manifest sources (`FileTransport`)
//! - `loader` - chunk loading collaborator
//! - `watch` - per-URL fetch/observe loop with fixed retry delay
//! - `runtime` - `HotRuntime`, process-wide owner of the above

mod hints;
mod loader;
mod runtime;
mod transport;
mod watch;


use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::sync::{broadcast, watch as signal};
use tokio::task::JoinSet;
use url::Url;

use crate::context::ContextRegistry;
use crate::manifest::{ManifestError, parse};
use crate::{debug, log};

pub use hints::HintTable;
pub use loader::{ChunkLoader, LoadError};
pub use runtime::HotRuntime;
pub use transport::{FileTransport, Transport, TransportError};
pub use watch::{DEFAULT_RETRY_DELAY, Watch};

// =============================================================================
// Accepted manifests
// =============================================================================

/// An accepted manifest with every reference resolved against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub source: Url,
    pub hash: String,
    pub version: u64,
    pub kernel: Option<FxHashSet<Url>>,
    /// Chunk URL -> root-relative module paths
    pub chunks: Vec<(Url, Vec<String>)>,
}

impl Resolved {
    fn resolve(source: &Url, raw: &[u8]) -> Result<Self, Rejection> {
        let manifest = parse(raw)?;

        let join = |reference: &str| {
            source
                .join(reference)
                .map_err(|_| Rejection::Unresolvable(reference.to_string()))
        };

        let kernel = match &manifest.kernel {
            Some(kernel) => Some(
                kernel
                    .iter()
                    .map(|r| join(r.as_str()))
                    .collect::<Result<FxHashSet<_>, _>>()?,
            ),
            None => None,
        };
        let chunks = manifest
            .chunks
            .iter()
            .map(|(reference, modules)| Ok((join(reference.as_str())?, modules.clone())))
            .collect::<Result<_, Rejection>>()?;

        Ok(Self {
            source: source.clone(),
            hash: manifest.hash,
            version: manifest.version,
            kernel,
            chunks,
        })
    }

    /// Every module path listed by any chunk.
    pub fn modules(&self) -> FxHashSet<&str> {
        self.chunks
            .iter()
            .flat_map(|(_, modules)| modules.iter().map(String::as_str))
            .collect()
    }
}

/// Why `tap` left the current state alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid manifest: {0}")]
    Invalid(#[from] ManifestError),

    #[error("reference `{0}` cannot be resolved")]
    Unresolvable(String),

    #[error("hash unchanged")]
    Unchanged,

    #[error("version {version} is not newer than {current}")]
    Stale { version: u64, current: u64 },

    #[error("source halted after a full reset")]
    Halted,

    #[error("no Tokio runtime to run the update loop on")]
    NoRuntime,
}

/// What one `update` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing accepted for this source yet
    Idle,
    /// Spawn set loaded, then absent contexts collected
    Applied {
        version: u64,
        loaded: usize,
        failed: usize,
        collected: usize,
    },
    /// A newer manifest arrived while loading; collection skipped
    Superseded { version: u64, loaded: usize, failed: usize },
    /// Own bootstrap chunk left the kernel; everything collected, source halted
    Reset { version: u64, collected: usize },
}

// =============================================================================
// Per-source state
// =============================================================================

struct Source {
    /// Latest accepted manifest
    current: ArcSwapOption<Resolved>,
    /// Serializes the accept check
    accept: Mutex<()>,
    /// Version of the last fully processed manifest
    processed: signal::Sender<u64>,
    /// Wakes the update loop
    updates: signal::Sender<u64>,
    halted: AtomicBool,
}

impl Source {
    fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            accept: Mutex::new(()),
            processed: signal::channel(0).0,
            updates: signal::channel(0).0,
            halted: AtomicBool::new(false),
        }
    }

    fn is_current(&self, manifest: &Arc<Resolved>) -> bool {
        self.current
            .load_full()
            .is_some_and(|current| Arc::ptr_eq(&current, manifest))
    }
}

// =============================================================================
// Driver
// =============================================================================

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Fixed delay between transport retries
    pub retry_delay: Duration,
    /// Chunk URL holding this process's reload runtime
    pub bootstrap: Option<Url>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            bootstrap: None,
        }
    }
}

/// Object-safe face of a driver, as stored by [`HotRuntime`].
pub trait Driver: Send + Sync {
    /// Transport kind; one driver per kind is connected.
    fn kind(&self) -> TypeId;
    /// Sync the watch set with the hint table.
    fn react(&self);
    /// Abort every watch.
    fn close(&self);
}

pub struct ReconciliationDriver<T, L> {
    transport: Arc<T>,
    loader: Arc<L>,
    registry: Arc<ContextRegistry>,
    hints: Arc<HintTable>,
    options: DriverOptions,
    sources: DashMap<Url, Arc<Source>>,
    watches: Mutex<FxHashMap<Url, Watch>>,
    outcomes: broadcast::Sender<(Url, UpdateOutcome)>,
}

impl<T: Transport, L: ChunkLoader> ReconciliationDriver<T, L> {
    pub fn new(
        transport: T,
        loader: L,
        registry: Arc<ContextRegistry>,
        hints: Arc<HintTable>,
        options: DriverOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(transport),
            loader: Arc::new(loader),
            registry,
            hints,
            options,
            sources: DashMap::new(),
            watches: Mutex::new(FxHashMap::default()),
            outcomes: broadcast::channel(64).0,
        })
    }

    /// State of `url`, starting its update loop on first sight.
    ///
    /// The loop is spawned on the caller's Tokio runtime; a source first
    /// seen outside one is not registered.
    fn source(self: &Arc<Self>, url: &Url) -> Result<Arc<Source>, Rejection> {
        if let Some(source) = self.sources.get(url) {
            return Ok(Arc::clone(source.value()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Rejection::NoRuntime)?;
        let source = match self.sources.entry(url.clone()) {
            Entry::Occupied(entry) => return Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => Arc::clone(&entry.insert(Arc::new(Source::new()))),
        };
        self.spawn_updates(&runtime, url.clone(), &source);
        Ok(source)
    }

    /// Outcome of every non-idle update, for observers.
    pub fn subscribe(&self) -> broadcast::Receiver<(Url, UpdateOutcome)> {
        self.outcomes.subscribe()
    }

    /// Latest accepted manifest of `source`.
    pub fn current(&self, source: &Url) -> Option<Arc<Resolved>> {
        self.sources.get(source)?.current.load_full()
    }

    /// URLs currently watched, sorted.
    pub fn watched(&self) -> Vec<Url> {
        let mut urls: Vec<_> = self.watches.lock().keys().cloned().collect();
        urls.sort();
        urls
    }

    pub fn is_halted(&self, source: &Url) -> bool {
        self.sources
            .get(source)
            .is_some_and(|s| s.halted.load(Ordering::SeqCst))
    }

    /// Offer raw manifest bytes from `source`.
    ///
    /// Accepts the first valid manifest of a source, then only manifests
    /// with a different hash and a strictly greater version. Accepted
    /// manifests are processed by the source's update loop, so the first
    /// `tap` of a source must happen inside a Tokio runtime.
    pub fn tap(self: &Arc<Self>, source: &Url, raw: &[u8]) -> Result<u64, Rejection> {
        let result = self
            .source(source)
            .and_then(|state| Self::accept(&state, source, raw));
        match &result {
            Ok(version) => debug!("driver"; "accepted {} v{}", source, version),
            Err(rejection) => debug!("driver"; "rejected {}: {}", source, rejection),
        }
        result
    }

    fn accept(state: &Source, source: &Url, raw: &[u8]) -> Result<u64, Rejection> {
        if state.halted.load(Ordering::SeqCst) {
            return Err(Rejection::Halted);
        }
        let next = Resolved::resolve(source, raw)?;

        let _guard = state.accept.lock();
        if let Some(current) = state.current.load_full() {
            if current.hash == next.hash {
                return Err(Rejection::Unchanged);
            }
            if next.version <= current.version {
                return Err(Rejection::Stale {
                    version: next.version,
                    current: current.version,
                });
            }
        }

        let version = next.version;
        state.current.store(Some(Arc::new(next)));
        state.updates.send_replace(version);
        Ok(version)
    }

    /// Single consumer per source: only the newest manifest is processed.
    fn spawn_updates(self: &Arc<Self>, runtime: &tokio::runtime::Handle, url: Url, source: &Arc<Source>) {
        let mut updates = source.updates.subscribe();
        let weak = Arc::downgrade(self);
        runtime.spawn(async move {
            while updates.changed().await.is_ok() {
                let Some(driver) = weak.upgrade() else {
                    break;
                };
                let outcome = driver.update(&url).await;
                driver.report(&url, &outcome);
                if outcome != UpdateOutcome::Idle {
                    // No receivers is fine
                    let _ = driver.outcomes.send((url.clone(), outcome));
                }
            }
        });
    }

    fn report(&self, url: &Url, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::Idle => {}
            UpdateOutcome::Applied {
                version,
                loaded,
                failed,
                collected,
            } => debug!("driver"; "{} v{}: {} loaded, {} failed, {} collected",
                url, version, loaded, failed, collected),
            UpdateOutcome::Superseded { version, .. } => {
                debug!("driver"; "{} v{} superseded while loading", url, version)
            }
            UpdateOutcome::Reset { version, collected } => {
                log!("driver"; "{} v{} dropped the runtime chunk, full reset ({} collected)",
                    url, version, collected)
            }
        }
    }

    /// Reconcile the process with the current manifest of `source`.
    pub async fn update(&self, source: &Url) -> UpdateOutcome {
        let Some(state) = self.sources.get(source).map(|s| Arc::clone(&s)) else {
            return UpdateOutcome::Idle;
        };
        let Some(manifest) = state.current.load_full() else {
            return UpdateOutcome::Idle;
        };
        if state.halted.load(Ordering::SeqCst) || *state.processed.borrow() >= manifest.version {
            return UpdateOutcome::Idle;
        }

        if self.needs_reset(&manifest) {
            state.halted.store(true, Ordering::SeqCst);
            let collected = self.registry.collect_all();
            if let Some(watch) = self.watches.lock().remove(source) {
                watch.abort();
            }
            self.transport.release(source);
            state.processed.send_replace(manifest.version);
            return UpdateOutcome::Reset {
                version: manifest.version,
                collected,
            };
        }

        let hinted = self.hints.modules(source);
        let spawn: Vec<Url> = manifest
            .chunks
            .iter()
            .filter(|(_, modules)| modules.iter().any(|m| hinted.contains(m)))
            .map(|(chunk, _)| chunk.clone())
            .collect();

        let (loaded, failed) = self.load_all(spawn).await;

        if !state.is_current(&manifest) {
            return UpdateOutcome::Superseded {
                version: manifest.version,
                loaded,
                failed,
            };
        }

        let exists = manifest.modules();
        let collected = self.registry.collect_where(|id| exists.contains(id));
        state.processed.send_replace(manifest.version);

        UpdateOutcome::Applied {
            version: manifest.version,
            loaded,
            failed,
            collected,
        }
    }

    fn needs_reset(&self, manifest: &Resolved) -> bool {
        match (&manifest.kernel, &self.options.bootstrap) {
            (Some(kernel), Some(bootstrap)) => !kernel.contains(bootstrap),
            _ => false,
        }
    }

    /// Load every chunk concurrently. Returns (loaded, failed).
    async fn load_all(&self, chunks: Vec<Url>) -> (usize, usize) {
        let mut set = JoinSet::new();
        for chunk in chunks {
            let loader = Arc::clone(&self.loader);
            set.spawn(async move {
                let result = loader.load(&chunk).await;
                (chunk, result)
            });
        }

        let (mut loaded, mut failed) = (0, 0);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => loaded += 1,
                Ok((chunk, Err(e))) => {
                    failed += 1;
                    debug!("driver"; "load {} failed: {}", chunk, e);
                }
                Err(e) => {
                    failed += 1;
                    debug!("driver"; "load task failed: {}", e);
                }
            }
        }
        (loaded, failed)
    }

    /// Wait until `source` has fully processed `version` or newer.
    pub async fn processed(self: &Arc<Self>, source: &Url, version: u64) {
        let Ok(state) = self.source(source) else {
            return;
        };
        let mut processed = state.processed.subscribe();
        // Sender lives as long as the source entry
        let _ = processed.wait_for(|done| *done >= version).await;
    }

    /// Start watches for newly hinted URLs, abort those no longer hinted.
    pub fn react(self: &Arc<Self>) {
        let hinted = self.hints.keys();
        let mut watches = self.watches.lock();

        for url in &hinted {
            if watches.contains_key(url) || self.is_halted(url) {
                continue;
            }
            if !self.transport.supports(url) {
                debug!("watch"; "no transport for {}", url);
                continue;
            }
            let weak = Arc::downgrade(self);
            let watch = Watch::spawn(
                url.clone(),
                Arc::clone(&self.transport),
                self.options.retry_delay,
                move |source, raw| {
                    if let Some(driver) = weak.upgrade() {
                        let _ = driver.tap(source, &raw);
                    }
                },
            );
            debug!("watch"; "watching {}", url);
            watches.insert(url.clone(), watch);
        }

        watches.retain(|url, watch| {
            let keep = hinted.contains(url);
            if !keep {
                watch.abort();
                self.transport.release(url);
                debug!("watch"; "stopped {}", url);
            }
            keep
        });
    }

    /// Abort every watch.
    pub fn close(&self) {
        let mut watches = self.watches.lock();
        for (url, watch) in watches.drain() {
            watch.abort();
            self.transport.release(&url);
        }
    }
}

/// Hands out `Arc<Self>` methods through the object-safe trait.
struct Connected<T, L>(Arc<ReconciliationDriver<T, L>>);

impl<T: Transport, L: ChunkLoader> Driver for Connected<T, L> {
    fn kind(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn react(&self) {
        self.0.react();
    }

    fn close(&self) {
        self.0.close();
    }
}

impl<T: Transport, L: ChunkLoader> ReconciliationDriver<T, L> {
    /// Type-erased handle for [`HotRuntime::connect`].
    pub fn handle(self: &Arc<Self>) -> Arc<dyn Driver> {
        Arc::new(Connected(Arc::clone(self)))
    }
}
