//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Hot-reload manifest publisher and follower
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: hotswap.toml)
    #[arg(short = 'C', long, global = true, default_value = "hotswap.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Publish the manifest of the last finished build
    #[command(visible_alias = "p")]
    Publish {
        #[command(flatten)]
        args: PublishArgs,
    },

    /// Follow a manifest and report reconciliation
    #[command(visible_alias = "f")]
    Follow {
        #[command(flatten)]
        args: FollowArgs,
    },

    /// Validate a manifest file and print its summary
    #[command(visible_alias = "i")]
    Inspect {
        /// Manifest file (default: the configured manifest)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        manifest: Option<PathBuf>,
    },
}

/// Publish command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Republish whenever the build graph changes
    #[arg(short, long)]
    pub watch: bool,

    /// Build graph file (overrides `build.graph`)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub graph: Option<PathBuf>,

    /// Output directory (overrides `build.output`)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Generations of output to keep (overrides `retention.generations`)
    #[arg(short = 'n', long)]
    pub generations: Option<i64>,
}

/// Follow command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct FollowArgs {
    /// Manifest file (default: the configured manifest)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub manifest: Option<PathBuf>,

    /// Module path to treat as a live boundary (repeatable; default: every
    /// module of the manifest at startup)
    #[arg(long = "hint", value_name = "MODULE")]
    pub hints: Vec<String>,

    /// Transport retry delay in milliseconds (overrides `watch.retry_delay_ms`)
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
}

impl Cli {
    pub const fn is_publish(&self) -> bool {
        matches!(self.command, Commands::Publish { .. })
    }

    pub const fn is_watch(&self) -> bool {
        matches!(&self.command, Commands::Publish { args } if args.watch)
    }
}
