//! Process-wide hot-reload state, owned by value.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use url::Url;

use super::{ChunkLoader, Driver, DriverOptions, HintTable, ReconciliationDriver, Transport};
use crate::context::{Context, ContextRegistry};
use crate::debug;
use crate::pulse::PulseScheduler;

/// Owns the context registry, hint table, pulse scheduler and drivers.
///
/// Every hint change pulses; each connected driver's `react` then runs once
/// per burst of changes.
pub struct HotRuntime {
    registry: Arc<ContextRegistry>,
    hints: Arc<HintTable>,
    pulse: Arc<PulseScheduler<TypeId>>,
    drivers: Mutex<FxHashMap<TypeId, Arc<dyn Driver>>>,
    frozen: AtomicBool,
}

impl Default for HotRuntime {
    fn default() -> Self {
        Self {
            registry: Arc::new(ContextRegistry::new()),
            hints: Arc::new(HintTable::new()),
            pulse: Arc::new(PulseScheduler::new()),
            drivers: Mutex::new(FxHashMap::default()),
            frozen: AtomicBool::new(false),
        }
    }
}

impl HotRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn hints(&self) -> &Arc<HintTable> {
        &self.hints
    }

    pub fn pulse(&self) -> &Arc<PulseScheduler<TypeId>> {
        &self.pulse
    }

    /// Build a driver sharing this runtime's registry and hint table.
    pub fn driver<T: Transport, L: ChunkLoader>(
        &self,
        transport: T,
        loader: L,
        options: DriverOptions,
    ) -> Arc<ReconciliationDriver<T, L>> {
        ReconciliationDriver::new(
            transport,
            loader,
            Arc::clone(&self.registry),
            Arc::clone(&self.hints),
            options,
        )
    }

    /// Connect a driver. A second driver of the same kind is ignored.
    ///
    /// Returns false once frozen.
    pub fn connect(&self, driver: Arc<dyn Driver>) -> bool {
        if self.is_frozen() {
            return false;
        }
        let kind = driver.kind();
        let mut drivers = self.drivers.lock();
        if drivers.contains_key(&kind) {
            return true;
        }
        let reactor = Arc::clone(&driver);
        drivers.insert(kind, driver);
        drop(drivers);

        self.pulse.add(kind, move || reactor.react());
        true
    }

    /// Record that boundary module `hint` is live.
    ///
    /// `manifest` is resolved against `module_url`, the location the
    /// boundary module was loaded from. Returns false once frozen or if the
    /// reference does not resolve.
    pub fn register(&self, hint: &str, manifest: &str, module_url: &Url) -> bool {
        if self.is_frozen() {
            return false;
        }
        let Ok(key) = module_url.join(manifest) else {
            debug!("driver"; "cannot resolve `{}` against {}", manifest, module_url);
            return false;
        };
        self.hints.insert(key, hint);
        self.pulse.pulse();
        true
    }

    /// Context for boundary `id` (see [`ContextRegistry::create`]).
    pub fn create(&self, id: &str, version: u64, url: Url) -> Arc<Context> {
        self.registry.create(id, version, url)
    }

    /// Abort every watch, disconnect every driver and forget all hints.
    pub fn clear(&self) {
        let drivers: Vec<_> = self.drivers.lock().drain().collect();
        for (kind, driver) in drivers {
            self.pulse.clear(&kind);
            driver.close();
        }
        self.hints.clear();
    }

    /// Clear, then refuse further `connect`/`register` calls.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
        self.clear();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Drive reactions until [`HotRuntime::shutdown`].
    pub async fn run(&self) {
        self.pulse.run().await;
    }

    pub fn shutdown(&self) {
        self.clear();
        self.pulse.close();
    }
}
