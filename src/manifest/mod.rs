//! Build manifest: chunk → module membership published after every build.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "hash": "<blake3 hex>",
//!   "version": 1718000000000,
//!   "kernel": ["../runtime.js"],
//!   "chunks": { "../app.js": ["main.ts", "views/a.ts"] }
//! }
//! ```
//!
//! Chunk keys and kernel entries are relative to the manifest file's
//! directory; module paths are relative to the project root.
//!
//! # Modules
//!
//! - `graph` - finished-build input handed over by the bundler
//! - `builder` - kernel closure, chunk table, fingerprint, version
//! - `hash` - blake3 fingerprint
//! - `validate` - schema validation of untrusted manifest bytes
//! - `publish` - write + retention flow for one build root

mod builder;
mod graph;
mod hash;
mod publish;
mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use builder::ManifestBuilder;
pub use graph::{BuildGraph, ModuleInfo, OutputChunk};
pub use hash::Fingerprint;
pub use publish::{Published, Publisher};
pub use validate::{ManifestError, parse};

/// Default manifest location inside the output directory.
pub const DEFAULT_MANIFEST_FILE: &str = "hot/hmr.json";

/// Versioned, hashed description of one build's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Fingerprint over `kernel` and `chunks`
    pub hash: String,
    /// Build timestamp in milliseconds, strictly increasing per build root
    pub version: u64,
    /// Chunks that must stay resident (absent in kernel-less variants)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<Vec<String>>,
    /// Chunk reference -> sorted root-relative module paths
    pub chunks: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Every module path listed by any chunk.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.chunks.values().flatten().map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
