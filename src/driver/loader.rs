//! Chunk loading collaborator.

use std::future::Future;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
#[error("failed to load `{url}`: {message}")]
pub struct LoadError {
    pub url: Url,
    pub message: String,
}

impl LoadError {
    pub fn new(url: &Url, message: impl Into<String>) -> Self {
        Self {
            url: url.clone(),
            message: message.into(),
        }
    }
}

/// Brings a chunk into the running process.
///
/// Loading an already loaded chunk must be a no-op. The returned future
/// resolves once the chunk is fully initialized.
pub trait ChunkLoader: Send + Sync + 'static {
    fn load(&self, chunk: &Url) -> impl Future<Output = Result<(), LoadError>> + Send;
}
