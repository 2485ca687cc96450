//! Hint table: manifest URL → module paths of live boundaries.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use url::Url;

#[derive(Debug, Default)]
pub struct HintTable {
    hints: Mutex<FxHashMap<Url, FxHashSet<String>>>,
}

impl HintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `module` as live under `manifest`. Returns true if it was new.
    pub fn insert(&self, manifest: Url, module: &str) -> bool {
        self.hints
            .lock()
            .entry(manifest)
            .or_default()
            .insert(module.to_string())
    }

    /// Manifest URLs currently hinted, sorted.
    pub fn keys(&self) -> Vec<Url> {
        let mut keys: Vec<_> = self.hints.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, manifest: &Url) -> bool {
        self.hints.lock().contains_key(manifest)
    }

    /// Live module paths under `manifest`.
    pub fn modules(&self, manifest: &Url) -> FxHashSet<String> {
        self.hints
            .lock()
            .get(manifest)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.hints.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hints.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_groups_by_manifest() {
        let table = HintTable::new();
        let a = Url::parse("file:///a/hot/hmr.json").unwrap();
        let b = Url::parse("file:///b/hot/hmr.json").unwrap();

        assert!(table.insert(a.clone(), "x.ts"));
        assert!(!table.insert(a.clone(), "x.ts"));
        assert!(table.insert(a.clone(), "y.ts"));
        assert!(table.insert(b.clone(), "x.ts"));

        assert_eq!(table.keys(), vec![a.clone(), b.clone()]);
        assert_eq!(table.modules(&a).len(), 2);
        assert!(table.modules(&b).contains("x.ts"));

        table.clear();
        assert!(table.is_empty());
        assert!(table.modules(&a).is_empty());
    }
}
