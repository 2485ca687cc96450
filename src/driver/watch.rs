//! Per-URL watch loop.
//!
//! ```text
//! fetch_latest ──> tap ──> observe ──> tap ──> observe ──> ...
//!      └─ retry after delay on failure ─┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use url::Url;

use super::transport::{Transport, TransportError};
use crate::debug;

/// Fixed delay between transport retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// A running watch on one manifest URL. Aborted on drop.
pub struct Watch {
    url: Url,
    task: JoinHandle<()>,
}

impl Watch {
    /// Start watching `url`, handing every payload to `tap`.
    pub fn spawn<T, F>(url: Url, transport: Arc<T>, retry_delay: Duration, tap: F) -> Self
    where
        T: Transport,
        F: Fn(&Url, Vec<u8>) + Send + 'static,
    {
        let task = tokio::spawn({
            let url = url.clone();
            async move {
                let transport = &*transport;
                let source = &url;

                let raw = until_ok("fetch", source, retry_delay, || transport.fetch_latest(source)).await;
                tap(source, raw);

                loop {
                    let raw = until_ok("observe", source, retry_delay, || transport.observe(source)).await;
                    tap(source, raw);
                }
            }
        });

        Self { url, task }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stop the loop. Calling it again does nothing.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Repeat `op` until it succeeds, sleeping `delay` after each failure.
async fn until_ok<F, Fut>(what: &str, url: &Url, delay: Duration, mut op: F) -> Vec<u8>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<u8>, TransportError>>,
{
    loop {
        match op().await {
            Ok(raw) => return raw,
            Err(e) => {
                debug!("watch"; "{} {} failed, retrying in {}ms: {}", what, url, delay.as_millis(), e);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
