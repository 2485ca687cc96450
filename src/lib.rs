//! hotswap - build manifests, artifact retention and runtime reconciliation
//! for in-place module hot swapping.
//!
//! # Build side
//!
//! ```text
//! bundler graph ──> ManifestBuilder ──> Publisher ──> hot/hmr.json
//!                                          └──> ArtifactRetention (sweep)
//! ```
//!
//! # Runtime side
//!
//! ```text
//! Transport ──> ReconciliationDriver ──> ChunkLoader
//!                   │        └──> ContextRegistry (collect)
//!                   └── PulseScheduler <── HintTable (register)
//! ```

pub mod logger;

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod driver;
pub mod manifest;
pub mod pulse;
pub mod retention;
pub mod utils;

pub use context::{Context, ContextRegistry, Lifecycle};
pub use driver::{
    ChunkLoader, DriverOptions, FileTransport, HotRuntime, ReconciliationDriver, Transport,
};
pub use manifest::{Manifest, ManifestBuilder};
pub use pulse::PulseScheduler;
pub use retention::ArtifactRetention;
