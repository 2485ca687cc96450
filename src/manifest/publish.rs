//! Publishing a build: manifest write plus retention bookkeeping.
//!
//! ```text
//! open() ──> build manifest ──> write ──> add outputs ──> finish() ──> sweep
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{BuildGraph, Manifest, ManifestBuilder};
use crate::retention::{RetentionHandle, SweepReport};

/// Result of one publish.
#[derive(Debug)]
pub struct Published {
    pub manifest: Manifest,
    /// Absolute manifest path
    pub path: PathBuf,
    /// Output files registered with retention (manifest included)
    pub files: usize,
    pub sweep: SweepReport,
}

/// Publishes the builds of one output directory.
pub struct Publisher {
    builder: ManifestBuilder,
    output: PathBuf,
    retention: RetentionHandle,
}

impl Publisher {
    pub fn new(builder: ManifestBuilder, output: impl Into<PathBuf>, retention: RetentionHandle) -> Self {
        Self {
            builder,
            output: output.into(),
            retention,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output.join(self.builder.manifest_file())
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Files currently protected from sweeping.
    pub fn tracked(&self) -> usize {
        self.retention.tracked()
    }

    /// Write the manifest of `graph` and sweep superseded output.
    pub async fn publish(&self, graph: &BuildGraph) -> Result<Published> {
        self.retention.open().await;

        let manifest = self.builder.build(graph);
        let path = self.manifest_path();
        if let Err(e) = write_manifest(&path, &manifest).await {
            // Release the gate without sweeping; outputs of this build stay untracked
            self.retention.publish();
            return Err(e);
        }

        let mut files = 0;
        for file in graph.output_files() {
            self.retention.add(&self.output, Path::new(file));
            files += 1;
        }
        self.retention
            .add(&self.output, Path::new(self.builder.manifest_file()));
        files += 1;

        let sweep = self.retention.finish().await;
        crate::debug!("publish"; "v{} {} ({} files)", manifest.version, &manifest.hash[..manifest.hash.len().min(16)], files);

        Ok(Published {
            manifest,
            path,
            files,
            sweep,
        })
    }
}

/// Write through a temporary sibling so readers never see a partial file.
async fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }

    let json = manifest.to_json()?;
    // Versions are unique, so overlapping publishes never share a temporary
    let tmp = path.with_extension(format!("json.{}.tmp", manifest.version));
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("failed to write `{}`", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move manifest into `{}`", path.display()))?;
    Ok(())
}
