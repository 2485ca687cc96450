//! Schema validation of untrusted manifest bytes.
//!
//! Manifests arrive from files or the network and may be truncated,
//! hand-edited or produced by another tool. Nothing is assumed about their
//! shape: the raw JSON is walked field by field and either a typed
//! [`Manifest`] or the first violated rule comes back.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::Manifest;

/// Why a manifest was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("not valid JSON: {0}")]
    Syntax(String),

    #[error("manifest must be a JSON object")]
    NotObject,

    #[error("`hash` must be a string")]
    Hash,

    #[error("`version` must be a non-negative integer")]
    Version,

    #[error("`kernel` must be an array of strings")]
    Kernel,

    #[error("`chunks` must be an object")]
    Chunks,

    #[error("chunk `{0}` must map to an array of strings")]
    ChunkMembers(String),
}

/// Parse and validate raw manifest bytes.
pub fn parse(raw: &[u8]) -> Result<Manifest, ManifestError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| ManifestError::Syntax(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ManifestError::NotObject);
    };

    let hash = match object.get("hash") {
        Some(Value::String(hash)) => hash.clone(),
        _ => return Err(ManifestError::Hash),
    };

    let version = object
        .get("version")
        .and_then(integer)
        .ok_or(ManifestError::Version)?;

    let kernel = match object.get("kernel") {
        None | Some(Value::Null) => None,
        Some(value) => Some(strings(value).ok_or(ManifestError::Kernel)?),
    };

    let chunks = match object.get("chunks") {
        Some(Value::Object(chunks)) => chunk_table(chunks)?,
        _ => return Err(ManifestError::Chunks),
    };

    Ok(Manifest {
        hash,
        version,
        kernel,
        chunks,
    })
}

/// Non-negative integral JSON number (integers written as `1.0` included).
fn integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn strings(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn chunk_table(chunks: &Map<String, Value>) -> Result<BTreeMap<String, Vec<String>>, ManifestError> {
    chunks
        .iter()
        .map(|(key, members)| {
            strings(members)
                .map(|members| (key.clone(), members))
                .ok_or_else(|| ManifestError::ChunkMembers(key.clone()))
        })
        .collect()
}
