use super::backend::{BackendError, ContentBackend, Entry, EntryQuery};
use crate::metrics_defs::{CONTENT_RATE_LIMITED, CONTENT_RETRIES_EXHAUSTED};
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep};

/// Total time a single call may spend retrying rate-limited requests.
pub const RETRY_BUDGET: Duration = Duration::from_secs(5 * 60);

#[derive(thiserror::Error, Debug)]
pub enum RetryError {
    #[error("content backend call failed: {0}")]
    NonRetryable(#[source] BackendError),
    #[error("content backend still rate limited after {elapsed:?}")]
    Exhausted {
        elapsed: Duration,
        #[source]
        source: BackendError,
    },
}

/// Wraps a [`ContentBackend`] and retries rate-limited calls.
///
/// The wait between attempts is exactly the reset period reported by the
/// backend. There is no limit on the number of attempts, only on the time
/// elapsed since the first one. A call that fails after the budget has run
/// out returns [`RetryError::Exhausted`].
pub struct RetryingClient {
    backend: Arc<dyn ContentBackend>,
    budget: Duration,
    interrupt: Arc<Notify>,
}

impl RetryingClient {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        RetryingClient {
            backend,
            budget: RETRY_BUDGET,
            interrupt: Arc::new(Notify::new()),
        }
    }

    /// Handle to cut short the waits that are in progress. Interrupted calls
    /// retry immediately instead of failing.
    pub fn interrupt_handle(&self) -> Arc<Notify> {
        self.interrupt.clone()
    }

    pub async fn query_entries(&self, query: &EntryQuery) -> Result<Vec<Entry>, RetryError> {
        let backend = self.backend.as_ref();
        self.with_retry("query_entries", move || backend.query_entries(query))
            .await
    }

    pub async fn update_entry(&self, entry: &Entry) -> Result<Entry, RetryError> {
        let backend = self.backend.as_ref();
        self.with_retry("update_entry", move || backend.update_entry(entry))
            .await
    }

    pub async fn publish_entry(&self, entry: &Entry) -> Result<(), RetryError> {
        let backend = self.backend.as_ref();
        self.with_retry("publish_entry", move || backend.publish_entry(entry))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let start = Instant::now();

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(wait) = err.retry_after() else {
                return Err(RetryError::NonRetryable(err));
            };

            let elapsed = start.elapsed();
            if elapsed > self.budget {
                counter!(CONTENT_RETRIES_EXHAUSTED).increment(1);
                tracing::error!(operation, ?elapsed, "Content backend retry budget exhausted");
                return Err(RetryError::Exhausted {
                    elapsed,
                    source: err,
                });
            }

            counter!(CONTENT_RATE_LIMITED).increment(1);
            tracing::warn!(
                operation,
                wait_secs = wait.as_secs(),
                "Rate limited by content backend, retrying"
            );

            tokio::select! {
                _ = sleep(wait) => {}
                _ = self.interrupt.notified() => {
                    tracing::debug!(operation, "Retry wait interrupted");
                }
            }
        }
    }
}
