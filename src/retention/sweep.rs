//! Best-effort deletion of unretained output files.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use rayon::prelude::*;
use regex::Regex;
use rustc_hash::FxHashSet;

/// Directory-relative patterns whose matches are never deleted.
#[derive(Debug, Clone)]
pub(super) struct KeepRule {
    pub dir: PathBuf,
    pub patterns: Vec<Regex>,
}

impl KeepRule {
    fn matches(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.dir) else {
            return false;
        };
        let rel = crate::utils::path::slashify(rel);
        self.patterns.iter().any(|re| re.is_match(&rel))
    }
}

/// What a sweep saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files found under governed directories
    pub scanned: usize,
    /// Files removed
    pub deleted: usize,
    /// Files that could not be removed (ignored)
    pub failed: usize,
}

/// Everything the sweep needs, captured while holding a ticket.
pub(super) struct SweepPlan {
    pub dirs: Vec<PathBuf>,
    pub retained: FxHashSet<PathBuf>,
    pub keep: Vec<KeepRule>,
}

impl SweepPlan {
    /// Scan every governed directory and delete unreferenced files.
    pub(super) fn execute(self) -> SweepReport {
        let mut files = FxHashSet::default();
        for dir in &self.dirs {
            // Missing directories simply contribute nothing
            files.extend(
                WalkDir::new(dir)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path()),
            );
        }

        let scanned = files.len();
        let victims: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| !self.retained.contains(path))
            .filter(|path| !self.keep.iter().any(|rule| rule.matches(path)))
            .collect();

        let deleted = victims
            .par_iter()
            .filter(|path| match std::fs::remove_file(path) {
                Ok(()) => true,
                Err(e) => {
                    crate::debug!("sweep"; "cannot remove {}: {}", path.display(), e);
                    false
                }
            })
            .count();

        SweepReport {
            scanned,
            deleted,
            failed: victims.len() - deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_execute_deletes_only_unretained() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let kept = dir.join("app.abc.js");
        let stale = dir.join("nested/app.old.js");
        touch(&kept);
        touch(&stale);

        let plan = SweepPlan {
            dirs: vec![dir.clone()],
            retained: [kept.clone()].into_iter().collect(),
            keep: vec![],
        };
        let report = plan.execute();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 1);
        assert!(kept.exists());
        assert!(!stale.exists());
        // Directories survive
        assert!(dir.join("nested").is_dir());
    }

    #[test]
    fn test_keep_rule_protects_matches() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let html = dir.join("index.html");
        let js = dir.join("chunk.js");
        touch(&html);
        touch(&js);

        let plan = SweepPlan {
            dirs: vec![dir.clone()],
            retained: FxHashSet::default(),
            keep: vec![KeepRule {
                dir: dir.clone(),
                patterns: vec![Regex::new(r"\.html$").unwrap()],
            }],
        };
        let report = plan.execute();

        assert_eq!(report.deleted, 1);
        assert!(html.exists());
        assert!(!js.exists());
    }

    #[test]
    fn test_missing_directory_is_ignored() {
        let temp = TempDir::new().unwrap();
        let plan = SweepPlan {
            dirs: vec![temp.path().join("does-not-exist")],
            retained: FxHashSet::default(),
            keep: vec![],
        };
        assert_eq!(plan.execute(), SweepReport::default());
    }

    #[test]
    fn test_overlapping_directories_counted_once() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        touch(&dir.join("sub/a.js"));

        let plan = SweepPlan {
            dirs: vec![dir.clone(), dir.join("sub")],
            retained: FxHashSet::default(),
            keep: vec![],
        };
        let report = plan.execute();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
    }
}
