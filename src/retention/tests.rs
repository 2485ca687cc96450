use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;

use super::*;

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, name).unwrap();
    path
}

fn output_dir() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let dir = normalize_path(temp.path());
    (temp, dir)
}

/// Give spawned tasks a chance to make progress.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn test_generations_with_depth_two() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(2, vec![]);
    let file = touch(&dir, "chunk.1.js");

    // build 1
    handle.open().await;
    handle.add(&dir, Path::new("chunk.1.js"));
    assert!(handle.publish());
    assert_eq!(handle.generation(&file), Some(0));

    // build 2
    handle.open().await;
    assert_eq!(handle.generation(&file), Some(1));
    handle.publish();
    assert!(retention.is_retained(&file));

    // build 3: counter reaches depth, still tracked until publish completes
    handle.open().await;
    assert_eq!(handle.generation(&file), Some(2));
    assert!(retention.is_retained(&file));
    handle.publish();

    assert!(!retention.is_retained(&file));
    assert_eq!(handle.tracked(), 0);

    let report = retention.sweep().await;
    assert_eq!(report.deleted, 1);
    assert!(!file.exists());
}

#[tokio::test]
async fn test_depth_zero_behaves_as_one() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(0, vec![]);
    touch(&dir, "a.js");

    handle.open().await;
    handle.add(&dir, Path::new("a.js"));
    handle.publish();
    assert_eq!(handle.tracked(), 1);

    handle.open().await;
    handle.publish();
    assert_eq!(handle.tracked(), 0);
}

#[tokio::test]
async fn test_sweep_waits_for_open_publish() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![]);
    let stale = touch(&dir, "stale.js");

    handle.open().await;
    handle.add(&dir, Path::new("fresh.js"));

    let sweep = {
        let retention = Arc::clone(&retention);
        tokio::spawn(async move { retention.sweep().await })
    };
    settle().await;
    assert!(!sweep.is_finished());
    assert!(stale.exists());

    let fresh = touch(&dir, "fresh.js");
    handle.publish();

    let report = sweep.await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[tokio::test]
async fn test_open_waits_for_running_sweep() {
    let retention = ArtifactRetention::new();
    let handle = Arc::new(retention.register(1, vec![]));

    let ticket = retention.enter().await;

    let publisher = {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { handle.open().await })
    };
    settle().await;
    assert!(!publisher.is_finished());

    retention.leave(ticket);
    tokio::time::timeout(Duration::from_secs(1), publisher)
        .await
        .expect("open should resume once the sweep leaves")
        .unwrap();
    assert!(handle.publish());
}

#[tokio::test]
async fn test_concurrent_publishers_and_tickets() {
    let retention = ArtifactRetention::new();
    let a = retention.register(1, vec![]);
    let b = retention.register(1, vec![]);

    // Overlapping builds open without blocking each other
    tokio::time::timeout(Duration::from_secs(1), async {
        a.open().await;
        b.open().await;
    })
    .await
    .expect("publishers must not exclude each other");

    a.publish();
    b.publish();

    // Several sweeps may hold tickets together
    let (t1, t2) = tokio::time::timeout(Duration::from_secs(1), async {
        let t1 = retention.enter().await;
        let t2 = retention.enter().await;
        (t1, t2)
    })
    .await
    .expect("tickets must not exclude each other");
    retention.leave(t1);
    retention.leave(t2);
}

#[tokio::test]
async fn test_overlapping_publishes_of_one_root() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![]);
    let stale = touch(&dir, "stale.js");

    // Two rebuilds of the same root in flight
    handle.open().await;
    handle.open().await;
    let a = touch(&dir, "a.chunk.js");
    handle.add(&dir, Path::new("a.chunk.js"));
    assert!(handle.publish());

    let sweep = {
        let retention = Arc::clone(&retention);
        tokio::spawn(async move { retention.sweep().await })
    };
    settle().await;
    // The second build is still open
    assert!(!sweep.is_finished());

    let b = touch(&dir, "b.chunk.js");
    handle.add(&dir, Path::new("b.chunk.js"));
    assert!(handle.publish());
    assert!(!handle.publish());

    let report = sweep.await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!stale.exists());
    assert!(a.exists());
    assert!(b.exists());
}

#[tokio::test]
async fn test_later_open_does_not_age_in_flight_files() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![]);
    let old = dir.join("old.js");
    let fresh = dir.join("fresh.js");

    handle.open().await;
    handle.add(&dir, Path::new("old.js"));
    handle.publish();

    // Build A adds a file, then build B of the same root opens
    handle.open().await;
    handle.add(&dir, Path::new("fresh.js"));
    handle.open().await;
    assert_eq!(handle.generation(&old), Some(2));
    assert_eq!(handle.generation(&fresh), Some(0));

    // A completes first: B is still open, nothing is evicted yet
    handle.publish();
    assert!(retention.is_retained(&old));
    assert!(retention.is_retained(&fresh));

    handle.publish();
    assert!(!retention.is_retained(&old));
    assert_eq!(handle.generation(&fresh), Some(0));
    assert_eq!(handle.tracked(), 1);
}

#[tokio::test]
async fn test_file_added_in_publish_survives_earlier_ticket() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![]);
    let earlier = retention.register(1, vec![]);

    // Another root governs the same directory
    earlier.open().await;
    earlier.add(&dir, Path::new("index.html"));
    touch(&dir, "index.html");
    earlier.publish();

    handle.open().await;
    // Ticket queued while the publish is open
    let sweep = {
        let retention = Arc::clone(&retention);
        tokio::spawn(async move { retention.sweep().await })
    };
    settle().await;
    assert!(!sweep.is_finished());

    let chunk = touch(&dir, "chunk.new.js");
    handle.add(&dir, Path::new("chunk.new.js"));
    handle.publish();

    sweep.await.unwrap();
    assert!(chunk.exists());
    assert!(dir.join("index.html").exists());
}

#[tokio::test]
async fn test_finish_shares_one_sweep() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let a = Arc::new(retention.register(1, vec![]));
    let b = Arc::new(retention.register(1, vec![]));
    let orphan = touch(&dir, "orphan.js");

    a.open().await;
    b.open().await;
    a.add(&dir, Path::new("a.js"));
    b.add(&dir, Path::new("b.js"));
    touch(&dir, "a.js");
    touch(&dir, "b.js");

    let first = {
        let a = Arc::clone(&a);
        tokio::spawn(async move { a.finish().await })
    };
    settle().await;
    // b still publishing: the shared sweep must not have started
    assert!(!first.is_finished());
    assert!(orphan.exists());

    let second = b.finish().await;
    let first = first.await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.deleted, 1);
    assert!(!orphan.exists());
    assert!(dir.join("a.js").exists());
    assert!(dir.join("b.js").exists());
}

#[tokio::test]
async fn test_keep_patterns_survive_sweep() {
    let (_temp, dir) = output_dir();
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![Regex::new(r"^static/").unwrap()]);
    let asset = touch(&dir, "static/logo.svg");
    let stale = touch(&dir, "old.js");

    handle.open().await;
    handle.add(&dir, Path::new("new.js"));
    touch(&dir, "new.js");
    let report = handle.finish().await;

    assert_eq!(report.deleted, 1);
    assert!(asset.exists());
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_dropped_handle_releases_gate() {
    let retention = ArtifactRetention::new();
    let handle = retention.register(1, vec![]);
    handle.open().await;
    drop(handle);

    let ticket = tokio::time::timeout(Duration::from_secs(1), retention.enter())
        .await
        .expect("a dropped root must not hold the gate");
    retention.leave(ticket);
    assert!(retention.governed_dirs().is_empty());
}
