//! Registry of live boundary contexts, one per id.
//!
//! Lifecycle changes happen under the registry lock; detach hooks run
//! after it is released so a hook may freely call back into the registry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use url::Url;

use super::{Context, ContextError, DetachHook, Lifecycle};
use crate::{debug, log};

#[derive(Default)]
pub struct ContextRegistry {
    contexts: Mutex<FxHashMap<String, Arc<Context>>>,
    /// Detach hooks that returned an error or panicked
    failures: AtomicUsize,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for boundary `id` at `version`.
    ///
    /// - no context yet: a new active one
    /// - same version registered: that one, untouched
    /// - newer version registered: a throwaway `Rejected` context
    /// - older version registered: a new context replacing it; the old
    ///   one is frozen and its hook receives the new one
    pub fn create(&self, id: &str, version: u64, url: Url) -> Arc<Context> {
        let mut contexts = self.contexts.lock();

        let previous = match contexts.get(id) {
            None => {
                let context = Context::new(id, version, url, Lifecycle::Active);
                contexts.insert(id.to_string(), Arc::clone(&context));
                return context;
            }
            Some(existing) if existing.version == version => return Arc::clone(existing),
            Some(existing) if existing.version > version => {
                debug!("context"; "`{}` v{} is older than registered v{}", id, version, existing.version);
                return Context::new(id, version, url, Lifecycle::Rejected);
            }
            Some(existing) => Arc::clone(existing),
        };

        let next = Context::new(id, version, url, Lifecycle::Pending);
        contexts.insert(id.to_string(), Arc::clone(&next));
        let hook = previous.freeze(Lifecycle::Superseded);
        drop(contexts);

        self.run_hook(&previous, hook, Some(&next));

        // A concurrent create may already have superseded `next`
        let contexts = self.contexts.lock();
        if contexts.get(id).is_some_and(|current| Arc::ptr_eq(current, &next)) {
            next.transition(Lifecycle::Pending, Lifecycle::Active);
        }
        drop(contexts);

        debug!("context"; "`{}` v{} -> v{}", id, previous.version, version);
        next
    }

    /// Retire `context` if it is still the ready one for its id.
    pub fn collect(&self, context: &Arc<Context>) -> bool {
        let mut contexts = self.contexts.lock();
        let current = contexts
            .get(context.id())
            .is_some_and(|current| Arc::ptr_eq(current, context));
        if !current || !context.is_ready() {
            return false;
        }
        contexts.remove(context.id());
        let hook = context.freeze(Lifecycle::Collected);
        drop(contexts);

        self.run_hook(context, hook, None);
        debug!("context"; "collected `{}` v{}", context.id(), context.version());
        true
    }

    /// Collect every ready context whose id fails `keep`.
    pub fn collect_where(&self, keep: impl Fn(&str) -> bool) -> usize {
        self.contexts()
            .iter()
            .filter(|context| !keep(context.id()))
            .filter(|context| self.collect(context))
            .count()
    }

    /// Collect every ready context.
    pub fn collect_all(&self) -> usize {
        self.collect_where(|_| false)
    }

    /// Registered context for `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Context>> {
        self.contexts.lock().get(id).cloned()
    }

    /// Snapshot of every registered context.
    pub fn contexts(&self) -> Vec<Arc<Context>> {
        self.contexts.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Number of detach hooks that failed so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    fn run_hook(&self, context: &Arc<Context>, hook: Option<DetachHook>, next: Option<&Arc<Context>>) {
        let Some(hook) = hook else {
            return;
        };

        // A panicking hook counts as a failed one
        let result = catch_unwind(AssertUnwindSafe(|| hook(next)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("hook panicked")));

        if let Err(e) = result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            let error = ContextError::Hook {
                id: context.id().to_string(),
                version: context.version(),
                message: format!("{e:#}"),
            };
            log!("context"; "{}", error);
        }
    }
}
