//! Output-relative references and module paths.
//!
//! Manifests never contain absolute paths: chunk references are relative
//! to the manifest's own directory and module paths are relative to the
//! project root, both with `/` separators.

use std::path::Path;

use url::Url;

use super::fs::{normalize_path, slashify};

/// Reference to `target` from inside `from_dir`, both output-relative.
///
/// # Examples
/// ```ignore
/// assert_eq!(relative_ref("hot", "app.js"), "../app.js");
/// assert_eq!(relative_ref("", "chunks/a.js"), "chunks/a.js");
/// assert_eq!(relative_ref("assets/js", "assets/css/a.css"), "../css/a.css");
/// ```
pub fn relative_ref(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = segments(from_dir).collect();
    let to: Vec<&str> = segments(target).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = std::iter::repeat_n("..", from.len() - common).collect();
    parts.extend(&to[common..]);
    parts.join("/")
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Root-relative module path, or `None` for modules outside `root`.
///
/// Virtual modules (ids that are not filesystem paths under the root)
/// also yield `None`.
pub fn module_ref(root: &Path, id: &str) -> Option<String> {
    let rel = Path::new(id).strip_prefix(root).ok()?;
    let rel = slashify(rel);
    (!rel.is_empty()).then_some(rel)
}

/// `file:` URL of a local path.
pub fn file_url(path: &Path) -> Option<Url> {
    Url::from_file_path(normalize_path(path)).ok()
}
