//! `hotswap inspect`: validate a manifest file and summarize it.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::config::HotswapConfig;
use crate::log;
use crate::manifest::{Fingerprint, Manifest, parse};
use crate::utils::path::normalize_path;

/// Entry point of the `inspect` command.
pub fn run(config: &HotswapConfig, manifest: Option<&Path>) -> Result<()> {
    let path = manifest.map_or_else(|| config.manifest_path(), normalize_path);
    let raw = std::fs::read(&path).with_context(|| format!("failed to read `{}`", path.display()))?;
    let manifest = parse(&raw).with_context(|| format!("`{}` rejected", path.display()))?;

    let shown = path.strip_prefix(&config.root).unwrap_or(&path);
    log!("manifest"; "{}", shown.display());
    print!("{}", describe(&manifest));
    Ok(())
}

/// Human-readable summary of a valid manifest.
fn describe(manifest: &Manifest) -> String {
    let mut out = String::new();
    let recomputed = Fingerprint::of_table(manifest.kernel.as_deref(), &manifest.chunks);
    let hash_note = match Fingerprint::from_hex(&manifest.hash) {
        Some(fingerprint) if fingerprint == recomputed => "matches table".green().to_string(),
        Some(_) => format!("differs from table, expected {}", recomputed)
            .yellow()
            .to_string(),
        None => "not a blake3 fingerprint".dimmed().to_string(),
    };

    let _ = writeln!(out, "version  {}", manifest.version);
    let _ = writeln!(out, "hash     {} ({})", manifest.hash, hash_note);
    match &manifest.kernel {
        Some(kernel) if !kernel.is_empty() => {
            let _ = writeln!(out, "kernel   {}", kernel.join(", "));
        }
        Some(_) => {
            let _ = writeln!(out, "kernel   {}", "(empty)".dimmed());
        }
        None => {
            let _ = writeln!(out, "kernel   {}", "(none)".dimmed());
        }
    }
    let _ = writeln!(
        out,
        "chunks   {} ({} modules)",
        manifest.chunks.len(),
        manifest.modules().count()
    );
    for (chunk, modules) in &manifest.chunks {
        let _ = writeln!(out, "  {} {}", chunk, format!("[{}]", modules.len()).dimmed());
    }
    out
}
