//! Path and URL utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `slashify`)
//! - [`route`]: Output-relative references (`relative_ref`, `module_ref`, `file_url`)

pub mod fs;
pub mod route;

pub use fs::{normalize_path, slashify};
pub use route::{file_url, module_ref, relative_ref};
