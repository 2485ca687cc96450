//! Configuration section definitions.
//!
//! | Module      | TOML Section    | Purpose                              |
//! |-------------|-----------------|--------------------------------------|
//! | `build`     | `[build]`       | Output layout, manifest, runtime id  |
//! | `retention` | `[retention]`   | Retention depth and keep patterns    |
//! | `watch`     | `[watch]`       | Retry delay and debounce timing      |

mod build;
mod retention;
mod watch;

pub use build::BuildConfig;
pub use retention::RetentionConfig;
pub use watch::WatchConfig;
