//! Project configuration management for `hotswap.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build], [retention], [watch]
//! ├── types/         # ConfigError, diagnostics, FieldPath
//! ├── util.rs        # upward config search
//! └── mod.rs         # HotswapConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section       | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | `[build]`     | Module root, output dir, manifest, runtime id  |
//! | `[retention]` | Generations kept on disk, keep patterns        |
//! | `[watch]`     | Transport retry delay, republish debounce      |

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{BuildConfig, RetentionConfig, WatchConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath, Finding};

use crate::{
    cli::{Cli, Commands},
    debug, log,
    utils::path::normalize_path,
};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::IsTerminal,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing hotswap.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotswapConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl HotswapConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd. `publish` needs a config file; `follow`
    /// and `inspect` fall back to defaults rooted at cwd.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cwd, &cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = path;
                config
            }
            None if cli.is_publish() => {
                bail!(ConfigError::NotFound(cwd.join(&cli.config)));
            }
            None => {
                debug!("config"; "{} not found, using defaults", cli.config.display());
                Self {
                    config_path: cwd.join(&cli.config),
                    ..Self::default()
                }
            }
        };

        config.finalize(cli, &cwd);
        config.validate()?;
        Ok(config)
    }

    /// Finalize configuration after loading.
    fn finalize(&mut self, cli: &Cli, cwd: &Path) {
        let root = self
            .config_path
            .parent()
            .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);

        self.apply_command_options(cli);
        self.normalize_paths(&root);
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
            if std::io::stdin().is_terminal() && !Self::prompt_continue()? {
                bail!("Aborted due to unknown config fields");
            }
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        eprintln!();
        log!("config"; "unknown fields in {}:", display_path);
        log!("config"; "ignoring:");
        for field in fields {
            eprintln!("- {}", field);
        }
        eprintln!();
    }

    /// Prompt user to continue. Returns true only if user explicitly confirms.
    fn prompt_continue() -> Result<bool> {
        use std::io::{self, Write};

        eprint!("Continue? [y/N] ");
        io::stderr().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        let input = input.trim().to_lowercase();
        Ok(input == "y" || input == "yes")
    }

    /// Absolute manifest location.
    pub fn manifest_path(&self) -> PathBuf {
        self.build.manifest_path()
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Publish { args } => {
                Self::update_option(&mut self.build.graph, args.graph.as_ref());
                Self::update_option(&mut self.build.output, args.output.as_ref());
                Self::update_option(&mut self.retention.generations, args.generations.as_ref());
            }
            Commands::Follow { args } => {
                Self::update_option(&mut self.watch.retry_delay_ms, args.retry_delay_ms.as_ref());
            }
            Commands::Inspect { .. } => {}
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Resolve every configured path against the project directory.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.config_path = normalize_path(&self.config_path);

        self.build.root = normalize_path(&root.join(&self.build.root));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.build.graph = normalize_path(&root.join(&self.build.graph));
        self.root = root;
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate every section, reporting all errors at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.build.validate(&mut diag);
        self.retention.validate(&mut diag);
        self.watch.validate(&mut diag);

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields to catch typos in tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> HotswapConfig {
    let (parsed, ignored) = HotswapConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(HotswapConfig::from_str("[build\noutput = \"dist\"").is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[build]\noutput = \"out\"\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = HotswapConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.build.output, PathBuf::from("out"));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_no_unknown_fields() {
        let content = "[build]\nruntime = \"rt\"\n[retention]\ngenerations = 2\n[watch]\ndebounce_ms = 50";
        let (_, ignored) = HotswapConfig::parse_with_ignored(content).unwrap();
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_finalize_resolves_against_config_dir() {
        let cli = Cli::parse_from(["hotswap", "publish", "-o", "public", "-n", "4"]);
        let mut config = test_parse_config("[build]\ngraph = \"out/graph.json\"");
        config.config_path = PathBuf::from("/srv/app/hotswap.toml");
        config.finalize(&cli, Path::new("/elsewhere"));

        assert_eq!(config.root, PathBuf::from("/srv/app"));
        assert_eq!(config.build.root, PathBuf::from("/srv/app/src"));
        assert_eq!(config.build.output, PathBuf::from("/srv/app/public"));
        assert_eq!(config.build.graph, PathBuf::from("/srv/app/out/graph.json"));
        assert_eq!(config.manifest_path(), PathBuf::from("/srv/app/public/hot/hmr.json"));
        assert_eq!(config.retention.depth(), 4);
    }

    #[test]
    fn test_follow_overrides_retry_delay() {
        let cli = Cli::parse_from(["hotswap", "follow", "--retry-delay-ms", "25"]);
        let mut config = HotswapConfig::default();
        config.apply_command_options(&cli);
        assert_eq!(config.watch.retry_delay_ms, 25);
    }

    #[test]
    fn test_validate_reports_every_section() {
        let config = test_parse_config(
            "[build]\nmanifest = \"../x.json\"\n[retention]\nkeep = [\"[\"]\n[watch]\nretry_delay_ms = 0",
        );
        let err = config.validate().unwrap_err();
        let Some(ConfigError::Diagnostics(diag)) = err.downcast_ref::<ConfigError>() else {
            panic!("expected diagnostics, got {err}");
        };
        assert_eq!(diag.len(), 3);
    }
}
