//! Artifact retention across overlapping builds.
//!
//! Every build root owns a [`RetentionHandle`]. Files it produces are
//! tracked with a generation counter: 0 when published, +1 on each later
//! `open()` of the same root, evicted once the counter reaches the root's
//! retention depth. A sweep deletes every file under a governed directory
//! that no handle still tracks.
//!
//! A root may have several publishes open at once (watch-mode rebuilds).
//! Files added while any of them is open stay in flight: they are neither
//! aged nor evicted until the root's last open publish completes.
//!
//! Publishing and sweeping never overlap (see [`gate`]):
//!
//! ```text
//! build A:  open ── add add add ── finish ─┐
//! build B:     open ── add ── finish ──────┼─> publish (last) ─> sweep ─> leave
//!                                          └─ both await the same sweep
//! ```

mod gate;
mod sweep;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::watch;

use gate::{Gate, Phase};
use sweep::{KeepRule, SweepPlan};

pub use sweep::SweepReport;

use crate::utils::path::normalize_path;

// =============================================================================
// Retention entry
// =============================================================================

/// Files produced by one build root.
#[derive(Debug, Default)]
struct RetentionEntry {
    /// Absolute output path -> generation (0 = just published)
    files: FxHashMap<PathBuf, u32>,
    /// Files added by publishes of this root that are still open
    in_flight: FxHashSet<PathBuf>,
    /// Opens not yet matched by a `publish()`
    opens: u32,
    /// Directories this entry governs
    dirs: FxHashSet<PathBuf>,
    /// Generations to keep
    depth: u32,
    /// Output-relative patterns never swept
    keep: Vec<Regex>,
}

impl RetentionEntry {
    fn age(&mut self) {
        for generation in self.files.values_mut() {
            *generation += 1;
        }
    }

    /// Settle in-flight files at generation 0, then evict.
    fn settle(&mut self) -> usize {
        for file in self.in_flight.drain() {
            self.files.insert(file, 0);
        }
        let before = self.files.len();
        let depth = self.depth;
        self.files.retain(|_, generation| *generation < depth);
        before - self.files.len()
    }
}

// =============================================================================
// ArtifactRetention
// =============================================================================

/// A held sweep ticket. Must be returned through [`ArtifactRetention::leave`].
#[derive(Debug)]
#[must_use = "a ticket blocks publishing until it is left"]
pub struct Ticket(u64);

/// Process-wide retention state shared by every build root.
pub struct ArtifactRetention {
    gate: Gate,
    entries: Mutex<FxHashMap<u64, RetentionEntry>>,
    next_entry: AtomicU64,
    /// The sweep currently in flight, joined by every `finish()`
    sweeper: Mutex<Option<watch::Receiver<Option<SweepReport>>>>,
}

impl ArtifactRetention {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Gate::new(),
            entries: Mutex::new(FxHashMap::default()),
            next_entry: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        })
    }

    /// Register a build root keeping `depth` generations (minimum 1).
    pub fn register(self: &Arc<Self>, depth: u32, keep: Vec<Regex>) -> RetentionHandle {
        let id = self.next_entry.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(
            id,
            RetentionEntry {
                depth: depth.max(1),
                keep,
                ..Default::default()
            },
        );
        RetentionHandle {
            id,
            retention: Arc::clone(self),
        }
    }

    /// Acquire a sweep ticket.
    ///
    /// The ticket is queued before this returns; the future resolves once
    /// no publish is in progress.
    pub fn enter(&self) -> impl Future<Output = Ticket> + Send + '_ {
        let ticket = self.gate.join_sweep();
        async move {
            self.gate.wait_for(Phase::Sweeping).await;
            Ticket(ticket)
        }
    }

    /// Release a sweep ticket. The last release lets queued publishers in.
    pub fn leave(&self, ticket: Ticket) {
        self.gate.leave_sweep(ticket.0);
    }

    /// Whether any entry currently references `path`.
    pub fn is_retained(&self, path: &Path) -> bool {
        self.entries
            .lock()
            .values()
            .any(|entry| entry.files.contains_key(path) || entry.in_flight.contains(path))
    }

    /// Every directory governed by any entry.
    pub fn governed_dirs(&self) -> Vec<PathBuf> {
        let entries = self.entries.lock();
        let mut dirs: Vec<_> = entries
            .values()
            .flat_map(|entry| entry.dirs.iter().cloned())
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        dirs.sort();
        dirs
    }

    /// Run one sweep under its own ticket.
    pub async fn sweep(&self) -> SweepReport {
        let ticket = self.enter().await;
        let report = self.sweep_held().await;
        self.leave(ticket);
        report
    }

    /// Start the shared sweep, or join the one already in flight.
    ///
    /// The ticket is queued synchronously, so a caller that still has to
    /// `publish()` is guaranteed the sweep runs after it.
    pub fn request_sweep(self: &Arc<Self>) -> SweepWaiter {
        let mut slot = self.sweeper.lock();
        if let Some(rx) = slot.as_ref() {
            return SweepWaiter(rx.clone());
        }

        let ticket = Ticket(self.gate.join_sweep());
        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        drop(slot);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.gate.wait_for(Phase::Sweeping).await;
            let report = this.sweep_held().await;
            this.sweeper.lock().take();
            this.leave(ticket);
            let _ = tx.send(Some(report));
        });

        SweepWaiter(rx)
    }

    /// Sweep body. Caller must hold a ticket.
    async fn sweep_held(&self) -> SweepReport {
        let plan = self.plan();
        let dirs = plan.dirs.len();
        let report = tokio::task::spawn_blocking(move || plan.execute())
            .await
            .unwrap_or_default();
        crate::debug!("sweep"; "{} dirs, {} scanned, {} deleted, {} failed",
            dirs, report.scanned, report.deleted, report.failed);
        report
    }

    fn plan(&self) -> SweepPlan {
        let entries = self.entries.lock();
        let mut dirs = FxHashSet::default();
        let mut retained = FxHashSet::default();
        let mut keep = Vec::new();

        for entry in entries.values() {
            dirs.extend(entry.dirs.iter().cloned());
            retained.extend(entry.files.keys().cloned());
            retained.extend(entry.in_flight.iter().cloned());
            if !entry.keep.is_empty() {
                keep.extend(entry.dirs.iter().map(|dir| KeepRule {
                    dir: dir.clone(),
                    patterns: entry.keep.clone(),
                }));
            }
        }

        SweepPlan {
            dirs: dirs.into_iter().collect(),
            retained,
            keep,
        }
    }
}

/// Completion handle of a shared sweep.
pub struct SweepWaiter(watch::Receiver<Option<SweepReport>>);

impl SweepWaiter {
    pub async fn wait(mut self) -> SweepReport {
        loop {
            if let Some(report) = self.0.borrow_and_update().clone() {
                return report;
            }
            if self.0.changed().await.is_err() {
                // Sweep task vanished (runtime shutting down)
                return SweepReport::default();
            }
        }
    }
}

// =============================================================================
// RetentionHandle
// =============================================================================

/// One build root's view of the retention state.
pub struct RetentionHandle {
    id: u64,
    retention: Arc<ArtifactRetention>,
}

impl RetentionHandle {
    /// Begin a publish.
    ///
    /// Queues immediately; resolves once no sweep is running, after which
    /// every published file of this root is one generation older. Each call
    /// must be matched by one `publish()`.
    pub fn open(&self) -> impl Future<Output = ()> + Send + '_ {
        if let Some(entry) = self.retention.entries.lock().get_mut(&self.id) {
            entry.opens += 1;
        }
        self.retention.gate.join_publish();
        async move {
            self.retention.gate.wait_for(Phase::Publishing).await;
            if let Some(entry) = self.retention.entries.lock().get_mut(&self.id) {
                entry.age();
            }
        }
    }

    /// Track `file` (relative to `dir`, or absolute) at generation 0.
    ///
    /// While a publish of this root is open the file stays in flight until
    /// the last one completes.
    pub fn add(&self, dir: &Path, file: &Path) {
        let dir = normalize_path(dir);
        let file = dir.join(file);
        if let Some(entry) = self.retention.entries.lock().get_mut(&self.id) {
            if entry.opens > 0 {
                entry.in_flight.insert(file);
            } else {
                entry.files.insert(file, 0);
            }
            entry.dirs.insert(dir);
        }
    }

    /// End one open publish of this root.
    ///
    /// The root's last open publish settles its in-flight files and evicts
    /// files that reached the retention depth. The last publisher overall
    /// releases any queued sweep. Returns false if this root had no publish
    /// open.
    pub fn publish(&self) -> bool {
        let evicted = {
            let mut entries = self.retention.entries.lock();
            let Some(entry) = entries.get_mut(&self.id) else {
                return false;
            };
            if entry.opens == 0 {
                return false;
            }
            entry.opens -= 1;
            if entry.opens == 0 { entry.settle() } else { 0 }
        };
        if evicted > 0 {
            crate::debug!("retain"; "evicted {} file(s) past retention depth", evicted);
        }
        self.retention.gate.leave_publish()
    }

    /// Publish and wait for the shared cleanup sweep that follows.
    pub async fn finish(&self) -> SweepReport {
        let sweep = self.retention.request_sweep();
        self.publish();
        sweep.wait().await
    }

    /// Current generation of a tracked file. In-flight files report 0.
    pub fn generation(&self, path: &Path) -> Option<u32> {
        let entries = self.retention.entries.lock();
        let entry = entries.get(&self.id)?;
        if entry.in_flight.contains(path) {
            return Some(0);
        }
        entry.files.get(path).copied()
    }

    /// Number of files this root still retains.
    pub fn tracked(&self) -> usize {
        self.retention.entries.lock().get(&self.id).map_or(0, |entry| {
            entry.files.len()
                + entry
                    .in_flight
                    .iter()
                    .filter(|file| !entry.files.contains_key(*file))
                    .count()
        })
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        let opens = self
            .retention
            .entries
            .lock()
            .remove(&self.id)
            .map_or(0, |entry| entry.opens);
        // A root that went away mid-publish releases its opens
        for _ in 0..opens {
            self.retention.gate.leave_publish();
        }
    }
}
