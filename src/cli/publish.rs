//! `hotswap publish`: turn the bundler's finished graph into a manifest.
//!
//! Watch mode republishes after every debounced change of the graph file.
//! Publishes may overlap; retention lets them share one sweep.
//!
//! ```text
//! notify ──> Debouncer ──ready──> spawn publish ──> WatchStatus
//!                                  spawn publish ──┘  (overlapping)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::HotswapConfig;
use crate::core;
use crate::logger::{status_error, status_success, status_unchanged};
use crate::manifest::{BuildGraph, Fingerprint, ManifestBuilder, Published, Publisher};
use crate::retention::ArtifactRetention;
use crate::utils::path::slashify;
use crate::{debug, log};

/// Publisher for the configured output directory.
///
/// A graph file inside the output directory is never swept.
pub fn publisher(config: &HotswapConfig) -> Publisher {
    let mut keep = config.retention.patterns();
    if let Ok(rel) = config.build.graph.strip_prefix(&config.build.output)
        && let Ok(rule) = Regex::new(&format!("^{}$", regex::escape(&slashify(rel))))
    {
        keep.push(rule);
    }

    let retention = ArtifactRetention::new();
    let handle = retention.register(config.retention.depth(), keep);

    let mut builder = ManifestBuilder::new(&config.build.root, config.build.manifest.as_str());
    if let Some(runtime) = &config.build.runtime {
        builder = builder.with_runtime(runtime.as_str());
    }
    Publisher::new(builder, &config.build.output, handle)
}

/// Publish the build described by the graph file at `graph`.
pub async fn publish_graph(publisher: &Publisher, graph: &Path) -> Result<Published> {
    let graph = BuildGraph::load(graph)?;
    publisher.publish(&graph).await
}

fn summary(published: &Published) -> String {
    let manifest = &published.manifest;
    let hash = Fingerprint::from_hex(&manifest.hash)
        .map_or_else(|| manifest.hash.clone(), |fingerprint| fingerprint.to_string());
    let mut line = format!(
        "v{} {} · {} chunks · {} files",
        manifest.version,
        hash,
        manifest.chunks.len(),
        published.files,
    );
    if published.sweep.deleted > 0 {
        line.push_str(&format!(" · {} swept", published.sweep.deleted));
    }
    line
}

/// Entry point of the `publish` command.
pub async fn run(config: &HotswapConfig, watch: bool) -> Result<()> {
    let publisher = Arc::new(publisher(config));
    let graph = config.build.graph.clone();

    if !watch {
        let published = publish_graph(&publisher, &graph).await?;
        log!("publish"; "{} -> {}", summary(&published), published.path.display());
        return Ok(());
    }

    watch_graph(publisher, graph, config.watch.debounce()).await
}

// ============================================================================
// Watch mode
// ============================================================================

async fn watch_graph(publisher: Arc<Publisher>, graph: PathBuf, debounce: Duration) -> Result<()> {
    let dir = graph
        .parent()
        .map(Path::to_path_buf)
        .context("build graph path has no parent directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create `{}`", dir.display()))?;

    // Watcher first, so changes during the initial publish are not lost
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            let _ = tx.send(event);
        }
        Err(e) => log!("watch"; "notify error: {}", e),
    })?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch `{}`", dir.display()))?;

    let shutdown = core::on_shutdown();
    let mut shutdown = tokio::task::spawn_blocking(move || shutdown.recv());

    let last_hash = Arc::new(Mutex::new(None::<String>));
    let mut publishes = JoinSet::new();
    let mut debouncer = Debouncer::new(&graph, debounce);

    log!("watch"; "watching {}", graph.display());
    if graph.exists() {
        publishes.spawn(publish_and_report(Arc::clone(&publisher), graph.clone(), Arc::clone(&last_hash)));
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            Some(event) = events.recv() => debouncer.add_event(&event),
            _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                if debouncer.take_if_ready() {
                    publishes.spawn(publish_and_report(
                        Arc::clone(&publisher),
                        graph.clone(),
                        Arc::clone(&last_hash),
                    ));
                }
                while publishes.try_join_next().is_some() {}
            }
        }
    }

    drop(watcher);
    while publishes.join_next().await.is_some() {}
    Ok(())
}

async fn publish_and_report(publisher: Arc<Publisher>, graph: PathBuf, last_hash: Arc<Mutex<Option<String>>>) {
    match publish_graph(&publisher, &graph).await {
        Ok(published) => {
            let previous = last_hash.lock().replace(published.manifest.hash.clone());
            if previous.as_deref() == Some(published.manifest.hash.as_str()) {
                status_unchanged(&format!("no chunk changes ({})", summary(&published)));
            } else {
                status_success(&format!("published {}", summary(&published)));
            }
        }
        Err(e) => status_error("publish failed", &format!("{e:#}")),
    }
}

/// Pure timing: coalesces bursts of writes to the graph file.
struct Debouncer {
    /// File name of the graph; other entries of the directory are ignored
    target: Option<std::ffi::OsString>,
    delay: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(graph: &Path, delay: Duration) -> Self {
        Self {
            target: graph.file_name().map(ToOwned::to_owned),
            delay,
            last_event: None,
        }
    }

    /// Record a notify event if it touches the graph file.
    ///
    /// Removals are skipped: bundlers replace the graph by rename, and the
    /// following create triggers the publish.
    fn add_event(&mut self, event: &notify::Event) {
        match event.kind {
            EventKind::Create(_) => {}
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }

        let touches = event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|name| Some(name) == self.target.as_deref()));
        if touches {
            debug!("watch"; "graph changed: {:?}", event.kind);
            self.last_event = Some(Instant::now());
        }
    }

    fn is_ready(&self) -> bool {
        self.last_event.is_some_and(|t| t.elapsed() >= self.delay)
    }

    fn take_if_ready(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.last_event = None;
        true
    }

    /// Precise sleep duration until next possible ready time.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.delay
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use crate::manifest::{OutputChunk, parse};
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind};
    use std::fs;
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_debouncer_filters_other_files() {
        let mut debouncer = Debouncer::new(Path::new("/p/dist/.graph.json"), Duration::ZERO);

        debouncer.add_event(&event(EventKind::Create(CreateKind::File), "/p/dist/app.js"));
        assert!(!debouncer.take_if_ready());

        debouncer.add_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            "/p/dist/.graph.json",
        ));
        assert!(!debouncer.take_if_ready());

        debouncer.add_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/p/dist/.graph.json",
        ));
        assert!(debouncer.take_if_ready());
        assert!(!debouncer.take_if_ready());
    }

    #[test]
    fn test_debouncer_waits_for_quiet_period() {
        let mut debouncer = Debouncer::new(Path::new("/p/.graph.json"), Duration::from_secs(60));
        assert_eq!(debouncer.sleep_duration(), Duration::from_secs(86400));

        debouncer.add_event(&event(EventKind::Create(CreateKind::File), "/p/.graph.json"));
        assert!(!debouncer.take_if_ready());
        assert!(debouncer.sleep_duration() <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_publish_graph_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src");
        let output = dir.path().join("dist");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("app.js"), "").unwrap();
        fs::write(output.join("stale.js"), "").unwrap();

        let graph = BuildGraph {
            chunks: vec![OutputChunk {
                file: "app.js".into(),
                modules: vec![root.join("main.ts").display().to_string()],
            }],
            ..Default::default()
        };
        let graph_path = output.join(".graph.json");
        fs::write(&graph_path, serde_json::to_vec(&graph).unwrap()).unwrap();

        let mut config = test_parse_config("");
        config.build.root = root;
        config.build.output = output.clone();
        config.build.graph = graph_path.clone();

        let publisher = publisher(&config);
        let published = publish_graph(&publisher, &graph_path).await.unwrap();

        let written = parse(&fs::read(&published.path).unwrap()).unwrap();
        assert_eq!(written, published.manifest);
        assert_eq!(written.chunks["../app.js"], ["main.ts"]);
        assert!(!output.join("stale.js").exists());
        assert!(graph_path.exists());
        assert!(summary(&published).contains("1 chunks"));
    }

    #[tokio::test]
    async fn test_overlapping_publishes_keep_both_builds() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src");
        let output = dir.path().join("dist");
        let graphs = dir.path().join("graphs");
        fs::create_dir_all(&output).unwrap();
        fs::create_dir_all(&graphs).unwrap();
        fs::write(output.join("stale.js"), "").unwrap();

        let mut paths = Vec::new();
        for name in ["one", "two"] {
            let file = format!("{name}.js");
            fs::write(output.join(&file), "").unwrap();
            let graph = BuildGraph {
                chunks: vec![OutputChunk {
                    file,
                    modules: vec![root.join(format!("{name}.ts")).display().to_string()],
                }],
                ..Default::default()
            };
            let path = graphs.join(format!("{name}.json"));
            fs::write(&path, serde_json::to_vec(&graph).unwrap()).unwrap();
            paths.push(path);
        }

        let mut config = test_parse_config("");
        config.build.root = root;
        config.build.output = output.clone();
        config.build.graph = paths[0].clone();

        let publisher = publisher(&config);
        let (first, second) = tokio::join!(
            publish_graph(&publisher, &paths[0]),
            publish_graph(&publisher, &paths[1]),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.manifest.version, second.manifest.version);
        assert!(output.join("one.js").exists());
        assert!(output.join("two.js").exists());
        assert!(!output.join("stale.js").exists());
        assert!(config.manifest_path().exists());
    }

    #[tokio::test]
    async fn test_publish_missing_graph_fails() {
        let dir = TempDir::new().unwrap();
        let mut config = HotswapConfig::default();
        config.build.output = dir.path().to_path_buf();

        let publisher = publisher(&config);
        assert!(publish_graph(&publisher, &dir.path().join("none.json")).await.is_err());
    }
}
