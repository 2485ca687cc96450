//! `[build]` section configuration.
//!
//! Where the bundler's finished build lives and how the manifest is laid
//! out inside it.
//!
//! # Example
//!
//! ```toml
//! [build]
//! root = "src"                    # module paths are relative to this
//! output = "dist"                 # bundler output directory
//! manifest = "hot/hmr.json"       # manifest file, relative to output
//! runtime = "hotswap/runtime"     # boundary-creation module id
//! graph = "dist/.graph.json"      # finished-build graph
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::manifest::DEFAULT_MANIFEST_FILE;

/// Build output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Project root; modules outside it are left out of the manifest.
    pub root: PathBuf,

    /// Output directory of the bundler.
    pub output: PathBuf,

    /// Manifest file, relative to `output`.
    pub manifest: String,

    /// Module id of the boundary-creation runtime. Without it the manifest
    /// carries an empty kernel.
    pub runtime: Option<String>,

    /// Graph file written by the bundler after each build.
    pub graph: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: "src".into(),
            output: "dist".into(),
            manifest: DEFAULT_MANIFEST_FILE.into(),
            runtime: None,
            graph: "dist/.graph.json".into(),
        }
    }
}

impl BuildConfig {
    const MANIFEST: FieldPath = FieldPath::new("build.manifest");
    const RUNTIME: FieldPath = FieldPath::new("build.runtime");

    /// Absolute manifest location.
    pub fn manifest_path(&self) -> PathBuf {
        self.output.join(&self.manifest)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        let manifest = Path::new(&self.manifest);
        if self.manifest.is_empty() {
            diag.error(Self::MANIFEST, "must not be empty");
        } else if manifest.is_absolute()
            || manifest
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            diag.error_with_hint(
                Self::MANIFEST,
                format!("`{}` must stay inside the output directory", self.manifest),
                format!("use a relative path such as \"{DEFAULT_MANIFEST_FILE}\""),
            );
        }

        if self.runtime.as_deref().is_some_and(str::is_empty) {
            diag.error(Self::RUNTIME, "must not be empty when set");
        }
    }
}
