//! Deduplicated, retried, memoized issue resolution.
//!
//! One [`IssueCache`] is constructed at run start and shared across every
//! report; it holds at most one promise per issue key and never re-fetches a
//! resolved record. The map favors memory over round trips: enumeration
//! scale is hundreds to low thousands of issues per run.

pub mod promise;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::cache::promise::{IssuePromise, RetryPolicy, SearchPromise};
use crate::tracker::{FetchResult, Fidelity, IssueKey, IssueRecord, TrackerClient};

/// Issues per search page.
pub const PAGE_SIZE: usize = 50;

/// Process-wide promise cache over a [`TrackerClient`].
pub struct IssueCache {
    client: Arc<dyn TrackerClient>,
    retry: RetryPolicy,
    issues: Mutex<HashMap<IssueKey, Arc<IssuePromise>>>,
}

impl IssueCache {
    pub fn new(client: Arc<dyn TrackerClient>) -> Self {
        Self::with_retry(client, RetryPolicy::default())
    }

    pub fn with_retry(client: Arc<dyn TrackerClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            issues: Mutex::new(HashMap::new()),
        }
    }

    /// The promise for `key`.
    ///
    /// Reuses the cached promise when its fidelity satisfies the request: a
    /// `Full` entry serves both request kinds, a `Basic` entry only serves
    /// `Basic` requests and is replaced when `Full` is asked for. Insert-if-
    /// absent runs under the map lock, so concurrent callers for the same
    /// key always end up holding the same promise.
    pub fn issue(&self, key: &IssueKey, fidelity: Fidelity) -> Arc<IssuePromise> {
        let mut map = self.issues.lock().expect("issue cache lock poisoned");
        if let Some(existing) = map.get(key) {
            if existing.fidelity() >= fidelity {
                return Arc::clone(existing);
            }
        }
        let promise = IssuePromise::fetch(
            Arc::clone(&self.client),
            self.retry.clone(),
            key.clone(),
            fidelity,
        );
        map.insert(key.clone(), Arc::clone(&promise));
        promise
    }

    /// Seed the cache with a record resolved as a byproduct of another
    /// operation (e.g. a search page row), avoiding a redundant round trip.
    /// Never downgrades an entry of equal or higher fidelity.
    pub fn register(&self, record: Arc<IssueRecord>, fidelity: Fidelity) {
        let mut map = self.issues.lock().expect("issue cache lock poisoned");
        match map.get(&record.key) {
            Some(existing) if existing.fidelity() >= fidelity => {}
            _ => {
                let key = record.key.clone();
                map.insert(key, IssuePromise::preresolved(record, fidelity));
            }
        }
    }

    /// Submit one search-page fetch. Pages are not cached: a query is
    /// enumerated once per run and its rows are registered individually.
    pub fn search_page(&self, query: &str, page_size: usize, offset: usize) -> SearchPromise {
        SearchPromise::fetch(
            Arc::clone(&self.client),
            self.retry.clone(),
            query.to_string(),
            page_size,
            offset,
        )
    }

    /// Basic records for every issue matching `query`.
    ///
    /// Probe-then-page: one probe fetch (page size 1) learns the total match
    /// count, then every page promise is submitted before any is claimed,
    /// and pages are claimed strictly in submission order. The concatenated
    /// result is deterministic no matter which page's round trip finishes
    /// first. The protocol assumes the total stays stable between the probe
    /// and the page fetches.
    pub async fn basic_issues(&self, query: &str) -> FetchResult<Vec<Arc<IssueRecord>>> {
        info!(query, "running tracker query");

        let probe = self.search_page(query, 1, 0).claim().await?;
        let total = probe.total;
        debug!(total, "submitting search pages");

        let pages: Vec<SearchPromise> = (0..total)
            .step_by(PAGE_SIZE)
            .map(|offset| self.search_page(query, PAGE_SIZE, offset))
            .collect();

        let mut issues = Vec::with_capacity(total);
        for page in &pages {
            let page = page.claim().await?;
            for issue in &page.issues {
                self.register(Arc::clone(issue), Fidelity::Basic);
                issues.push(Arc::clone(issue));
            }
        }
        debug!(count = issues.len(), "tracker query complete");
        Ok(issues)
    }

    /// Resolved records for every issue matching `query`: the basic pass
    /// first, then one issue promise per key, all submitted before any is
    /// claimed.
    pub async fn issues(
        &self,
        query: &str,
        fidelity: Fidelity,
    ) -> FetchResult<Vec<Arc<IssueRecord>>> {
        let basics = self.basic_issues(query).await?;
        let promises: Vec<_> = basics
            .iter()
            .map(|b| self.issue(&b.key, fidelity))
            .collect();
        let mut out = Vec::with_capacity(promises.len());
        for promise in promises {
            out.push(promise.claim().await?);
        }
        Ok(out)
    }
}
