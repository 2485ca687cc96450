//! `[retention]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! generations = 2                 # builds whose output stays on disk
//! keep = ["^static/", "\\.map$"]  # output-relative paths never swept
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Output retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Retention depth. Values <= 0 behave as 1.
    pub generations: i64,

    /// Regexes matched against slash-separated output-relative paths.
    pub keep: Vec<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            generations: 1,
            keep: Vec::new(),
        }
    }
}

impl RetentionConfig {
    const GENERATIONS: FieldPath = FieldPath::new("retention.generations");
    const KEEP: FieldPath = FieldPath::new("retention.keep");

    /// Effective retention depth.
    pub fn depth(&self) -> u32 {
        u32::try_from(self.generations.max(1)).unwrap_or(u32::MAX)
    }

    /// Compiled keep patterns. Invalid entries are reported by `validate`.
    pub fn patterns(&self) -> Vec<Regex> {
        self.keep.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.generations <= 0 {
            diag.warn(
                Self::GENERATIONS,
                format!("{} is treated as 1", self.generations),
            );
        }

        for pattern in &self.keep {
            if let Err(e) = Regex::new(pattern) {
                diag.error_with_hint(
                    Self::KEEP,
                    format!("invalid pattern `{pattern}`"),
                    e.to_string(),
                );
            }
        }
    }
}
