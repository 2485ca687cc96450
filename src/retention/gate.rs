//! Two-phase publish/sweep gate.
//!
//! Publishers and sweeps exclude each other; each side admits any number of
//! members while it holds the gate. Every `open()` counts as its own
//! publisher, so one root may have several publishes in flight.
//!
//! ```text
//!            join_publish               leave_publish (last)
//!   Idle ─────────────────> Publishing ──────────────────────> Sweeping | Idle
//!   Idle ─────────────────> Sweeping   ──────────────────────> Publishing | Idle
//!            join_sweep                 leave_sweep (last)
//! ```
//!
//! Registration is synchronous and waiting is asynchronous, so callers can
//! queue themselves before yielding. The side that empties hands the gate
//! straight to the other side if anyone is queued there.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Publishing,
    Sweeping,
}

struct GateState {
    phase: Phase,
    /// Opens not yet matched by a `publish()`, admitted or queued
    publishers: usize,
    /// Sweep tickets, admitted or queued
    tickets: FxHashSet<u64>,
    next_ticket: u64,
}

pub(super) struct Gate {
    state: Mutex<GateState>,
    changed: Notify,
}

impl Gate {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: Phase::Idle,
                publishers: 0,
                tickets: FxHashSet::default(),
                next_ticket: 0,
            }),
            changed: Notify::new(),
        }
    }

    pub(super) fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Queue a publisher. Claims the gate if it is idle.
    pub(super) fn join_publish(&self) {
        let mut state = self.state.lock();
        state.publishers += 1;
        if state.phase == Phase::Idle {
            state.phase = Phase::Publishing;
            drop(state);
            self.changed.notify_waiters();
        }
    }

    /// Remove a publisher. Returns false if none was queued.
    pub(super) fn leave_publish(&self) -> bool {
        let mut state = self.state.lock();
        if state.publishers == 0 {
            return false;
        }
        state.publishers -= 1;
        if state.publishers == 0 && state.phase == Phase::Publishing {
            state.phase = if state.tickets.is_empty() {
                Phase::Idle
            } else {
                Phase::Sweeping
            };
            drop(state);
            self.changed.notify_waiters();
        }
        true
    }

    /// Queue a sweep and return its ticket id. Claims the gate if idle.
    pub(super) fn join_sweep(&self) -> u64 {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.tickets.insert(ticket);
        if state.phase == Phase::Idle {
            state.phase = Phase::Sweeping;
            drop(state);
            self.changed.notify_waiters();
        }
        ticket
    }

    /// Release a sweep ticket. Returns false if it was not held.
    pub(super) fn leave_sweep(&self, ticket: u64) -> bool {
        let mut state = self.state.lock();
        if !state.tickets.remove(&ticket) {
            return false;
        }
        if state.tickets.is_empty() && state.phase == Phase::Sweeping {
            state.phase = if state.publishers == 0 {
                Phase::Idle
            } else {
                Phase::Publishing
            };
            drop(state);
            self.changed.notify_waiters();
        }
        true
    }

    /// Suspend until the gate is in `phase`.
    pub(super) async fn wait_for(&self, phase: Phase) {
        loop {
            // Register before checking so a transition in between is not lost
            let notified = self.changed.notified();
            if self.state.lock().phase == phase {
                return;
            }
            notified.await;
        }
    }
}
