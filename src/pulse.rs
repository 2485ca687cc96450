//! Coalescing reaction scheduler.
//!
//! Reactions are registered under a key. A [`PulseScheduler::pulse`] marks
//! every registered reaction runnable; the next [`PulseScheduler::drain`]
//! runs each runnable reaction at most once, no matter how many pulses
//! arrived in between.
//!
//! ```text
//! pulse() ──┐
//! pulse() ──┼──> pending {(key, id)} ──drain()──> reaction() × 1
//! pulse() ──┘
//! ```
//!
//! A pending marker remembers the identity of the reaction it was queued
//! for. If the key is cleared, or re-registered with another reaction
//! before the drain, the marker is stale and skipped.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;

/// A reaction callback.
pub type Reaction = Arc<dyn Fn() + Send + Sync>;

/// Identity of one registration (distinguishes re-registrations of a key).
type ReactionId = u64;

struct Registered {
    id: ReactionId,
    reaction: Reaction,
}

struct Inner<K> {
    reactions: FxHashMap<K, Registered>,
    /// Registration ids with a queued marker (dedup)
    queued: FxHashSet<ReactionId>,
    /// Markers in pulse order
    pending: Vec<(K, ReactionId)>,
    next_id: ReactionId,
}

/// Single-consumer coalescing scheduler.
pub struct PulseScheduler<K> {
    inner: Mutex<Inner<K>>,
    wake: Notify,
    closed: AtomicBool,
}

impl<K> PulseScheduler<K>
where
    K: Eq + Hash + Clone + Send,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                reactions: FxHashMap::default(),
                queued: FxHashSet::default(),
                pending: Vec::new(),
                next_id: 0,
            }),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Register `reaction` under `key`.
    ///
    /// Returns false (and does nothing) if the key is already registered.
    /// A successful registration pulses immediately.
    pub fn add(&self, key: K, reaction: impl Fn() + Send + Sync + 'static) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.reactions.contains_key(&key) {
                return false;
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.reactions.insert(
                key,
                Registered {
                    id,
                    reaction: Arc::new(reaction),
                },
            );
        }
        self.pulse();
        true
    }

    /// Unregister `key`. Pulses if something was removed.
    pub fn clear(&self, key: &K) -> bool {
        let removed = self.inner.lock().reactions.remove(key).is_some();
        if removed {
            self.pulse();
        }
        removed
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.lock().reactions.contains_key(key)
    }

    /// Mark every registered reaction runnable for the next drain.
    pub fn pulse(&self) {
        let mut queued_any = false;
        {
            let mut inner = self.inner.lock();
            let Inner {
                reactions,
                queued,
                pending,
                ..
            } = &mut *inner;
            for (key, registered) in reactions.iter() {
                if queued.insert(registered.id) {
                    pending.push((key.clone(), registered.id));
                    queued_any = true;
                }
            }
        }
        if queued_any {
            self.wake.notify_one();
        }
    }

    /// Run every pending reaction once. Returns how many ran.
    ///
    /// Reactions run without the scheduler lock held, so they may pulse,
    /// add or clear. A pulse issued by a running reaction is picked up by
    /// the next drain, not this one.
    pub fn drain(&self) -> usize {
        let batch = {
            let mut inner = self.inner.lock();
            let pending = std::mem::take(&mut inner.pending);
            pending
                .into_iter()
                .filter_map(|(key, id)| {
                    inner.queued.remove(&id);
                    match inner.reactions.get(&key) {
                        Some(registered) if registered.id == id => {
                            Some(registered.reaction.clone())
                        }
                        _ => None,
                    }
                })
                .collect::<Vec<_>>()
        };

        for reaction in &batch {
            reaction();
        }
        batch.len()
    }

    /// Drain loop. Runs until [`PulseScheduler::close`] is called.
    pub async fn run(&self) {
        while !self.closed.load(Ordering::SeqCst) {
            self.wake.notified().await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            self.drain();
        }
    }

    /// Stop the drain loop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

impl<K> Default for PulseScheduler<K>
where
    K: Eq + Hash + Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
