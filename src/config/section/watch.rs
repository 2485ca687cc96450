//! `[watch]` section configuration.
//!
//! ```toml
//! [watch]
//! retry_delay_ms = 3000    # delay between failed transport attempts
//! debounce_ms = 300        # quiet period before republishing
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Watch timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub retry_delay_ms: u64,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 3000,
            debounce_ms: 300,
        }
    }
}

impl WatchConfig {
    const RETRY_DELAY: FieldPath = FieldPath::new("watch.retry_delay_ms");

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.retry_delay_ms == 0 {
            diag.error_with_hint(
                Self::RETRY_DELAY,
                "must be greater than 0",
                "a failing transport would otherwise retry in a busy loop",
            );
        }
    }
}
