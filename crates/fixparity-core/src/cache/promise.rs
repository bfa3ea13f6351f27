//! Retryable, memoized, single-flight fetch promises.
//!
//! A promise owns its request parameters and an eagerly spawned fetch task.
//! The first `claim` joins the task and memoizes the outcome; every later or
//! concurrent claimant observes the same resolved value or the same terminal
//! failure. Promises are never invalidated: a resolved record is a snapshot
//! for the lifetime of one run.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::tracker::{
    FetchError, FetchResult, Fidelity, IssueKey, IssueRecord, SearchPage, TrackerClient,
};

/// Bounded-retry policy for transient tracker failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the initial call included.
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_backoff)
    }
}

/// Run `op` under `policy`: transient failures are retried with exponential
/// backoff, permanent failures propagate immediately, and exhausting the
/// budget promotes the last failure to [`FetchError::RetriesExhausted`].
pub(crate) async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let mut delay = policy.initial_backoff;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_attempts {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                warn!(what, attempt, backoff_ms = delay.as_millis() as u64, %err,
                    "transient tracker failure, backing off");
                tokio::time::sleep(delay).await;
                delay = policy.next_backoff(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Memoized slot shared by every promise flavor: a spawned fetch task joined
/// at most once, its outcome cached for all claimants.
struct PromiseInner<T> {
    handle: Mutex<Option<JoinHandle<FetchResult<Arc<T>>>>>,
    cell: OnceCell<FetchResult<Arc<T>>>,
}

impl<T: Send + Sync + 'static> PromiseInner<T> {
    fn spawn<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = FetchResult<Arc<T>>> + Send + 'static,
    {
        Self {
            handle: Mutex::new(Some(tokio::spawn(fut))),
            cell: OnceCell::new(),
        }
    }

    fn resolved(value: Arc<T>) -> Self {
        Self {
            handle: Mutex::new(None),
            cell: OnceCell::new_with(Some(Ok(value))),
        }
    }

    async fn claim(&self) -> FetchResult<Arc<T>> {
        self.cell
            .get_or_init(|| async {
                let handle = self.handle.lock().expect("promise lock poisoned").take();
                match handle {
                    Some(handle) => handle.await.unwrap_or_else(|e| {
                        Err(FetchError::Internal(format!("fetch task failed: {e}")))
                    }),
                    // Unreachable by construction: a promise starts with
                    // either a task handle or a pre-filled cell.
                    None => Err(FetchError::Internal(
                        "promise claimed without a fetch task".to_string(),
                    )),
                }
            })
            .await
            .clone()
    }
}

/// Deferred handle to one issue fetch.
pub struct IssuePromise {
    key: IssueKey,
    fidelity: Fidelity,
    inner: PromiseInner<IssueRecord>,
}

impl IssuePromise {
    /// Spawn a retryable fetch for `key` at `fidelity`.
    pub(crate) fn fetch(
        client: Arc<dyn TrackerClient>,
        retry: RetryPolicy,
        key: IssueKey,
        fidelity: Fidelity,
    ) -> Arc<Self> {
        let task_key = key.clone();
        let inner = PromiseInner::spawn(async move {
            run_with_retry(&retry, task_key.as_str(), || {
                let client = Arc::clone(&client);
                let key = task_key.clone();
                async move { client.fetch_issue(key.as_str(), fidelity).await }
            })
            .await
            .map(Arc::new)
        });
        Arc::new(Self {
            key,
            fidelity,
            inner,
        })
    }

    /// Wrap an already-resolved record, e.g. one lifted off a search page.
    pub(crate) fn preresolved(record: Arc<IssueRecord>, fidelity: Fidelity) -> Arc<Self> {
        Arc::new(Self {
            key: record.key.clone(),
            fidelity,
            inner: PromiseInner::resolved(record),
        })
    }

    pub fn key(&self) -> &IssueKey {
        &self.key
    }

    pub fn fidelity(&self) -> Fidelity {
        self.fidelity
    }

    /// Wait for the fetch and return the shared outcome.
    pub async fn claim(&self) -> FetchResult<Arc<IssueRecord>> {
        self.inner.claim().await
    }
}

/// Deferred handle to one search-page fetch.
pub struct SearchPromise {
    inner: PromiseInner<SearchPage>,
}

impl SearchPromise {
    pub(crate) fn fetch(
        client: Arc<dyn TrackerClient>,
        retry: RetryPolicy,
        query: String,
        page_size: usize,
        offset: usize,
    ) -> Self {
        let inner = PromiseInner::spawn(async move {
            run_with_retry(&retry, "search", || {
                let client = Arc::clone(&client);
                let query = query.clone();
                async move { client.search(&query, page_size, offset).await }
            })
            .await
            .map(Arc::new)
        });
        Self { inner }
    }

    pub async fn claim(&self) -> FetchResult<Arc<SearchPage>> {
        self.inner.claim().await
    }
}
