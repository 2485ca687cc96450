//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from `start`
///
/// Returns the path of the first `config_name` found in `start` or one of
/// its ancestors. An absolute `config_name` is returned as is when it
/// exists.
///
/// # Example
/// ```text
/// /home/user/app/src/views/   ← start
/// /home/user/app/hotswap.toml ← found!
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}
