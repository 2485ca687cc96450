//! Finished-build graph handed over by the bundler.
//!
//! The bundler's chunking machinery is not part of this crate. After each
//! build it dumps the module import graph and the produced output files:
//!
//! ```json
//! {
//!   "modules": {
//!     "/p/src/main.ts": { "imports": ["/p/src/a.ts"], "dynamic_imports": [] },
//!     "\u0000main.ts?hmr-create": { "imports": ["/p/node_modules/hotswap/runtime.js"], "wrapper": true }
//!   },
//!   "chunks": [ { "file": "app.js", "modules": ["/p/src/main.ts", "/p/src/a.ts"] } ],
//!   "assets": [ "style.css" ]
//! }
//! ```

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// One module of the build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Statically imported module ids
    #[serde(default)]
    pub imports: Vec<String>,
    /// Dynamically imported module ids
    #[serde(default)]
    pub dynamic_imports: Vec<String>,
    /// Boundary-creation wrapper generated for a hot-swap boundary
    #[serde(default)]
    pub wrapper: bool,
}

/// One output file containing code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Output-relative file name
    pub file: String,
    /// Module ids bundled into this chunk
    #[serde(default)]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildGraph {
    #[serde(default)]
    pub modules: FxHashMap<String, ModuleInfo>,
    #[serde(default)]
    pub chunks: Vec<OutputChunk>,
    /// Output-relative non-code files
    #[serde(default)]
    pub assets: Vec<String>,
}

impl BuildGraph {
    /// Read a graph dump.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read build graph `{}`", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("invalid build graph `{}`", path.display()))
    }

    /// Look up a module id.
    pub fn resolve(&self, id: &str) -> Option<&ModuleInfo> {
        self.modules.get(id)
    }

    /// Ids of all boundary-creation wrappers.
    pub fn wrappers(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .filter(|(_, info)| info.wrapper)
            .map(|(id, _)| id.as_str())
    }

    /// Seeds plus everything they import, statically or dynamically.
    pub fn closure<'a>(&'a self, seeds: impl IntoIterator<Item = &'a str>) -> FxHashSet<&'a str> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for seed in seeds {
            if seen.insert(seed) {
                queue.push_back(seed);
            }
        }

        while let Some(id) = queue.pop_front() {
            let Some(info) = self.modules.get(id) else {
                continue;
            };
            for next in info.imports.iter().chain(&info.dynamic_imports) {
                if seen.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }

        seen
    }

    /// Every output file of the build (chunks, then assets).
    pub fn output_files(&self) -> impl Iterator<Item = &str> {
        self.chunks
            .iter()
            .map(|chunk| chunk.file.as_str())
            .chain(self.assets.iter().map(String::as_str))
    }
}
