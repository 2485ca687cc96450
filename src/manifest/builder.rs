//! Manifest computation for one build root.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashSet;

use super::{BuildGraph, Fingerprint, Manifest};
use crate::utils::path::{module_ref, relative_ref};

/// Turns finished builds into manifests.
///
/// One builder lives as long as its build root so versions keep
/// increasing across rebuilds, even when the clock does not.
#[derive(Debug)]
pub struct ManifestBuilder {
    /// Absolute project root; module paths are expressed relative to it
    root: PathBuf,
    /// Output-relative manifest location
    manifest_file: String,
    /// Module id of the reload runtime
    runtime: Option<String>,
    last_version: AtomicU64,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, manifest_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            manifest_file: manifest_file.into(),
            runtime: None,
            last_version: AtomicU64::new(0),
        }
    }

    /// Module id of the reload runtime. The kernel stays empty while this
    /// id is not part of the build graph.
    pub fn with_runtime(mut self, id: impl Into<String>) -> Self {
        self.runtime = Some(id.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }

    /// Output-relative directory holding the manifest.
    fn manifest_dir(&self) -> &str {
        self.manifest_file
            .rsplit_once(['/', '\\'])
            .map_or("", |(dir, _)| dir)
    }

    /// Compute the manifest of a finished build.
    pub fn build(&self, graph: &BuildGraph) -> Manifest {
        let hot = self.hot_modules(graph);
        let manifest_dir = self.manifest_dir();

        let mut kernel = BTreeSet::new();
        let mut chunks = BTreeMap::new();

        for chunk in &graph.chunks {
            let reference = relative_ref(manifest_dir, &chunk.file);

            if chunk.modules.iter().any(|id| hot.contains(id.as_str())) {
                kernel.insert(reference.clone());
            }

            let mut members: Vec<String> = chunk
                .modules
                .iter()
                .filter_map(|id| module_ref(&self.root, id))
                .collect();
            if members.is_empty() {
                continue;
            }
            members.sort();
            members.dedup();
            chunks.insert(reference, members);
        }

        let kernel: Vec<String> = kernel.into_iter().collect();
        let hash = Fingerprint::of_table(Some(&kernel), &chunks).to_hex();

        Manifest {
            hash,
            version: self.next_version(),
            kernel: Some(kernel),
            chunks,
        }
    }

    /// Wrapper modules and everything reachable from them.
    fn hot_modules<'a>(&self, graph: &'a BuildGraph) -> FxHashSet<&'a str> {
        match self.runtime.as_deref() {
            Some(runtime) if graph.resolve(runtime).is_some() => graph.closure(graph.wrappers()),
            Some(runtime) => {
                crate::debug!("manifest"; "runtime `{}` not in build graph, kernel left empty", runtime);
                FxHashSet::default()
            }
            None => FxHashSet::default(),
        }
    }

    /// Current time in milliseconds, bumped past the previous version.
    fn next_version(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        let mut last = self.last_version.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last_version.compare_exchange_weak(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ModuleInfo, OutputChunk};

    const ROOT: &str = "/p/src";

    fn graph() -> BuildGraph {
        let mut graph = BuildGraph::default();
        let mut add = |id: &str, imports: &[&str], wrapper: bool| {
            graph.modules.insert(
                id.to_string(),
                ModuleInfo {
                    imports: imports.iter().map(|s| s.to_string()).collect(),
                    dynamic_imports: vec![],
                    wrapper,
                },
            );
        };
        add("/p/src/main.ts", &["/p/src/a.ts", "\0a.ts?hmr-create"], false);
        add("/p/src/a.ts", &[], false);
        add("\0a.ts?hmr-create", &["/p/rt/runtime.js"], true);
        add("/p/rt/runtime.js", &["/p/rt/util.js"], false);
        add("/p/rt/util.js", &[], false);

        graph.chunks = vec![
            OutputChunk {
                file: "app.js".into(),
                modules: vec!["/p/src/main.ts".into(), "/p/src/a.ts".into()],
            },
            OutputChunk {
                file: "chunks/rt.js".into(),
                modules: vec!["/p/rt/runtime.js".into(), "/p/rt/util.js".into()],
            },
            OutputChunk {
                file: "chunks/wrap.js".into(),
                modules: vec!["\0a.ts?hmr-create".into()],
            },
        ];
        graph.assets = vec!["style.css".into()];
        graph
    }

    #[test]
    fn test_chunks_are_root_relative_and_sorted() {
        let manifest = ManifestBuilder::new(ROOT, "hot/hmr.json").build(&graph());
        assert_eq!(manifest.chunks.len(), 1);
        assert_eq!(manifest.chunks["../app.js"], ["a.ts", "main.ts"]);
    }

    #[test]
    fn test_kernel_from_wrapper_closure() {
        let manifest = ManifestBuilder::new(ROOT, "hot/hmr.json")
            .with_runtime("/p/rt/runtime.js")
            .build(&graph());
        assert_eq!(
            manifest.kernel.as_deref(),
            Some(&["../chunks/rt.js".to_string(), "../chunks/wrap.js".to_string()][..])
        );
    }

    #[test]
    fn test_unresolved_runtime_leaves_kernel_empty() {
        let builder = ManifestBuilder::new(ROOT, "hot/hmr.json").with_runtime("/p/rt/missing.js");
        assert_eq!(builder.build(&graph()).kernel, Some(vec![]));

        let builder = ManifestBuilder::new(ROOT, "hot/hmr.json");
        assert_eq!(builder.build(&graph()).kernel, Some(vec![]));
    }

    #[test]
    fn test_rebuild_keeps_hash_and_bumps_version() {
        let builder = ManifestBuilder::new(ROOT, "hmr.json").with_runtime("/p/rt/runtime.js");
        let first = builder.build(&graph());
        let mut changed = graph();
        changed.assets.push("logo.svg".into());
        let second = builder.build(&changed);

        assert_eq!(first.hash, second.hash);
        assert!(second.version > first.version);
    }

    #[test]
    fn test_membership_change_changes_hash() {
        let builder = ManifestBuilder::new(ROOT, "hmr.json");
        let first = builder.build(&graph());
        let mut changed = graph();
        changed.chunks[0].modules.push("/p/src/z.ts".into());
        let second = builder.build(&changed);
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn test_versions_strictly_increase() {
        let builder = ManifestBuilder::new(ROOT, "hmr.json");
        let versions: Vec<u64> = (0..100).map(|_| builder.next_version()).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_manifest_at_output_root() {
        let manifest = ManifestBuilder::new(ROOT, "hmr.json").build(&graph());
        assert!(manifest.chunks.contains_key("app.js"));
    }
}
