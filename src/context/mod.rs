//! Hot-swap boundary contexts.
//!
//! A boundary module asks the [`ContextRegistry`] for a [`Context`] when it
//! loads and installs a detach hook on it. When a newer version of the same
//! boundary loads, the old context's hook receives the successor so state
//! can be handed over; when the boundary disappears from the build, the
//! hook runs with no successor.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──> Active ──> Superseded   (newer version created)
//!                   └──> Collected    (absent from the current manifest)
//! Rejected                             (older version than the registered one)
//! ```
//!
//! Only `Pending` and `Active` contexts accept mutations; the other states
//! are frozen and never come back.

mod registry;


use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use url::Url;

pub use registry::ContextRegistry;

/// Hook run once when a context is superseded (with the successor) or
/// collected (with `None`).
pub type DetachHook = Box<dyn FnOnce(Option<&Arc<Context>>) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Installed in the registry, predecessor still detaching
    Pending,
    /// The one ready context of its id
    Active,
    /// Replaced by a newer version
    Superseded,
    /// Removed after its id left the build
    Collected,
    /// Throwaway handed to an outdated caller, never registered
    Rejected,
}

impl Lifecycle {
    pub const fn is_frozen(self) -> bool {
        !matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Collected => "collected",
            Self::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context `{id}` v{version} is {state} and can no longer change")]
    Frozen {
        id: String,
        version: u64,
        state: Lifecycle,
    },

    #[error("detach hook of `{id}` v{version} failed: {message}")]
    Hook {
        id: String,
        version: u64,
        message: String,
    },
}

struct ContextState {
    lifecycle: Lifecycle,
    hook: Option<DetachHook>,
    /// Value handed over between versions
    data: Option<Box<dyn Any + Send>>,
}

/// One hot-swap boundary instance.
pub struct Context {
    id: String,
    version: u64,
    url: Url,
    state: Mutex<ContextState>,
}

impl Context {
    fn new(id: &str, version: u64, url: Url, lifecycle: Lifecycle) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            version,
            url,
            state: Mutex::new(ContextState {
                lifecycle,
                hook: None,
                data: None,
            }),
        })
    }

    /// Stable boundary id (root-relative module path).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Manifest version that created this context.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Location the boundary module was loaded from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    pub fn is_frozen(&self) -> bool {
        self.lifecycle().is_frozen()
    }

    /// Install the detach hook, replacing any previous one.
    pub fn on_detach<F>(&self, hook: F) -> Result<(), ContextError>
    where
        F: FnOnce(Option<&Arc<Context>>) -> anyhow::Result<()> + Send + 'static,
    {
        let mut state = self.mutable()?;
        state.hook = Some(Box::new(hook));
        Ok(())
    }

    /// Store a value for the boundary to pick up (typically called on the
    /// successor from inside a detach hook).
    pub fn put<T: Any + Send>(&self, value: T) -> Result<(), ContextError> {
        let mut state = self.mutable()?;
        state.data = Some(Box::new(value));
        Ok(())
    }

    /// Take the stored value if it has type `T`.
    pub fn take<T: Any + Send>(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.lifecycle.is_frozen() {
            return None;
        }
        match state.data.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                state.data = Some(other);
                None
            }
        }
    }

    fn mutable(&self) -> Result<parking_lot::MutexGuard<'_, ContextState>, ContextError> {
        let state = self.state.lock();
        if state.lifecycle.is_frozen() {
            return Err(ContextError::Frozen {
                id: self.id.clone(),
                version: self.version,
                state: state.lifecycle,
            });
        }
        Ok(state)
    }

    /// Move to `to` if currently in `from`.
    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        let mut state = self.state.lock();
        if state.lifecycle != from {
            return false;
        }
        state.lifecycle = to;
        true
    }

    /// Freeze into `to`, handing back the hook and dropping stored data.
    fn freeze(&self, to: Lifecycle) -> Option<DetachHook> {
        let mut state = self.state.lock();
        if state.lifecycle.is_frozen() {
            return None;
        }
        state.lifecycle = to;
        state.data = None;
        state.hook.take()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
