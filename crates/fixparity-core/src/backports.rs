//! Backport link-graph resolution.
//!
//! Fixes propagate between release trains as "Backport"-linked issues. The
//! resolver walks those links one level deep: an issue with exactly one
//! inbound Backport link has a parent, anything else is its own root, and a
//! root's backport set is whatever its outbound Backport links reach.
//! Grandchildren are never followed.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::cache::IssueCache;
use crate::tracker::{
    FetchResult, Fidelity, IssueKey, IssueRecord, LinkDirection, BACKPORT_LINK, RELATES_LINK,
};

/// Label marking release-note records.
pub const RELEASE_NOTE_LABEL: &str = "release-note";

/// A root record plus its one-level backport set, insertion-ordered and
/// deduplicated by key.
#[derive(Debug, Clone)]
pub struct BackportEntry {
    root: Arc<IssueRecord>,
    members: Vec<Arc<IssueRecord>>,
    keys: HashSet<IssueKey>,
}

impl BackportEntry {
    fn new(root: Arc<IssueRecord>) -> Self {
        Self {
            root,
            members: Vec::new(),
            keys: HashSet::new(),
        }
    }

    fn push(&mut self, member: Arc<IssueRecord>) {
        if self.keys.insert(member.key.clone()) {
            self.members.push(member);
        }
    }

    pub fn root(&self) -> &Arc<IssueRecord> {
        &self.root
    }

    /// Backport members in insertion order; includes the root itself when
    /// the map was built with `include_root_as_self`.
    pub fn members(&self) -> &[Arc<IssueRecord>] {
        &self.members
    }

    pub fn contains(&self, key: &IssueKey) -> bool {
        self.keys.contains(key)
    }
}

/// Map from root key to its backport entry, iterated in deterministic key
/// order for reproducible report output.
#[derive(Debug, Clone, Default)]
pub struct BackportMap {
    entries: BTreeMap<IssueKey, BackportEntry>,
}

impl BackportMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IssueKey) -> Option<&BackportEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IssueKey, &BackportEntry)> {
        self.entries.iter()
    }

    fn insert_root(&mut self, root: Arc<IssueRecord>, include_root_as_self: bool) {
        let key = root.key.clone();
        let mut entry = BackportEntry::new(Arc::clone(&root));
        if include_root_as_self {
            entry.push(root);
        }
        self.entries.insert(key, entry);
    }

    fn push_member(&mut self, root_key: &IssueKey, member: Arc<IssueRecord>) {
        if let Some(entry) = self.entries.get_mut(root_key) {
            entry.push(member);
        }
    }
}

/// Resolves parent/backport relationships through the shared issue cache.
pub struct BackportResolver {
    cache: Arc<IssueCache>,
}

impl BackportResolver {
    pub fn new(cache: Arc<IssueCache>) -> Self {
        Self { cache }
    }

    /// The parent key of `issue`, present iff the issue carries exactly one
    /// inbound Backport link.
    ///
    /// Zero links means the issue is an original fix; two or more mean the
    /// ancestry is ambiguous. Both resolve to "no parent" and the issue is
    /// treated as its own root. Ambiguity is never an error.
    pub fn parent_key(issue: &IssueRecord) -> Option<&IssueKey> {
        let mut links = issue.links_of(BACKPORT_LINK, LinkDirection::Inbound);
        let first = links.next()?;
        if links.next().is_some() {
            return None;
        }
        Some(&first.target)
    }

    /// The root parent (or the issue itself) for every issue matching
    /// `query`, deduplicated by key, in query order.
    pub async fn parent_issues(&self, query: &str) -> FetchResult<Vec<Arc<IssueRecord>>> {
        let basics = self.cache.basic_issues(query).await?;

        // Parent resolution needs link sets, so upgrade everything to full
        // fidelity; promises are all submitted before any claim, and claimed
        // in submission order.
        let full: Vec<_> = basics
            .iter()
            .map(|b| self.cache.issue(&b.key, Fidelity::Full))
            .collect();
        let resolved = join_all(full.iter().map(|p| p.claim()))
            .await
            .into_iter()
            .collect::<FetchResult<Vec<_>>>()?;

        let parents: Vec<_> = resolved
            .iter()
            .map(|issue| Self::parent_key(issue).map(|k| self.cache.issue(k, Fidelity::Full)))
            .collect();

        let mut seen = HashSet::new();
        let mut roots = Vec::with_capacity(resolved.len());
        for (issue, parent) in resolved.iter().zip(&parents) {
            let root = match parent {
                Some(promise) => promise.claim().await?,
                None => Arc::clone(issue),
            };
            if seen.insert(root.key.clone()) {
                roots.push(root);
            }
        }
        debug!(count = roots.len(), "resolved root issues");
        Ok(roots)
    }

    /// Map every root of `query` to the issues reachable via a single
    /// outbound Backport link.
    ///
    /// With `include_root_as_self` the root joins its own set, so a
    /// downstream version scan sees the root's fix versions symmetrically
    /// with its children's. Traversal depth is exactly one level.
    pub async fn backport_map(
        &self,
        query: &str,
        include_root_as_self: bool,
    ) -> FetchResult<BackportMap> {
        let roots = self.parent_issues(query).await?;

        let mut pending = Vec::new();
        for (idx, root) in roots.iter().enumerate() {
            for link in root.links_of(BACKPORT_LINK, LinkDirection::Outbound) {
                pending.push((idx, self.cache.issue(&link.target, Fidelity::Full)));
            }
        }

        let mut map = BackportMap::default();
        for root in &roots {
            map.insert_root(Arc::clone(root), include_root_as_self);
        }
        for (idx, promise) in pending {
            let child = promise.claim().await?;
            map.push_member(&roots[idx].key, child);
        }
        debug!(roots = map.len(), "built backport map");
        Ok(map)
    }

    /// Every release-note record attached to `issue`: the issue itself when
    /// directly labeled, plus labeled subtasks and "Relates"-linked issues.
    ///
    /// All matches are collected; the remote data sometimes carries several
    /// note records per fix, and none of them is privileged.
    pub async fn release_notes(
        &self,
        issue: &Arc<IssueRecord>,
    ) -> FetchResult<Vec<Arc<IssueRecord>>> {
        let mut promises = Vec::new();
        for subtask in &issue.subtasks {
            promises.push(self.cache.issue(subtask, Fidelity::Full));
        }
        for link in issue.links.iter().filter(|l| l.link_type == RELATES_LINK) {
            promises.push(self.cache.issue(&link.target, Fidelity::Full));
        }

        let mut seen = HashSet::new();
        let mut notes = Vec::new();
        if issue.has_label(RELEASE_NOTE_LABEL) {
            seen.insert(issue.key.clone());
            notes.push(Arc::clone(issue));
        }
        for promise in promises {
            let candidate = promise.claim().await?;
            if candidate.has_label(RELEASE_NOTE_LABEL) && seen.insert(candidate.key.clone()) {
                notes.push(candidate);
            }
        }
        Ok(notes)
    }
}
