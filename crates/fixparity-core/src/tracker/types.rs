//! Issue data model: immutable snapshots of remote tracker state.
//!
//! Records are resolved once and shared via `Arc`; nothing here mutates
//! after construction.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Link type connecting a backport to its parent fix.
pub const BACKPORT_LINK: &str = "Backport";

/// Link type connecting related issues (release notes live behind these).
pub const RELATES_LINK: &str = "Relates";

/// Stable issue identifier, e.g. `PROJ-8265432`.
///
/// Ordered by project component first, then numeric id, so report maps
/// iterate in a stable, human-expected order regardless of fetch order.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project prefix and numeric id, when the key follows `PROJ-NNNN`.
    fn parts(&self) -> Option<(&str, u64)> {
        let (project, num) = self.0.rsplit_once('-')?;
        Some((project, num.parse().ok()?))
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IssueKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl Ord for IssueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.parts(), other.parts()) {
            (Some((pa, na)), Some((pb, nb))) => pa.cmp(pb).then(na.cmp(&nb)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for IssueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How much of an issue a fetch populates.
///
/// `Basic` records carry only the cheap fields; `Full` records carry
/// everything including links, subtasks, and comments. The order matters:
/// a `Full` result satisfies a `Basic` request, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Basic,
    Full,
}

/// Direction of a typed link relative to the issue that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    Inbound,
    Outbound,
}

/// A typed, directed link to another issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link type name; only [`BACKPORT_LINK`] and [`RELATES_LINK`] are
    /// interpreted by the core.
    pub link_type: String,
    pub direction: LinkDirection,
    pub target: IssueKey,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

/// Immutable snapshot of one tracker issue at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: IssueKey,
    pub summary: String,
    pub description: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub created: Option<DateTime<Utc>>,
    /// Resolution timestamp without offset; `None` while unresolved or when
    /// the remote value failed to parse.
    pub resolution_date: Option<NaiveDateTime>,
    pub components: Vec<String>,
    pub labels: Vec<String>,
    pub fix_versions: Vec<String>,
    pub links: Vec<Link>,
    pub subtasks: Vec<IssueKey>,
    pub comments: Vec<Comment>,
}

/// Shape violations in resolved records.
#[derive(Debug, Clone, Error)]
pub enum RecordError {
    /// Fatal for every code path that assumes one fix version per issue.
    /// The parity classifier is the only consumer prepared for more.
    #[error("issue {key} carries multiple fix versions")]
    MultipleFixVersions { key: IssueKey },
}

impl IssueRecord {
    /// The single fix version of this issue, `None` when unassigned.
    ///
    /// Fails when the issue carries more than one fix version; callers that
    /// can handle multiplicity read [`IssueRecord::fix_versions`] directly.
    pub fn fix_version(&self) -> Result<Option<&str>, RecordError> {
        let mut it = self.fix_versions.iter();
        let first = it.next();
        if it.next().is_some() {
            return Err(RecordError::MultipleFixVersions {
                key: self.key.clone(),
            });
        }
        Ok(first.map(String::as_str))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Links of the given type and direction, in record order.
    pub fn links_of<'a>(
        &'a self,
        link_type: &'a str,
        direction: LinkDirection,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter(move |l| l.link_type == link_type && l.direction == direction)
    }

    /// Components joined with `/`, matching the report column format.
    pub fn components_joined(&self) -> String {
        self.components.join("/")
    }
}

/// One page of search results plus the remote's total match count.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub total: usize,
    pub issues: Vec<Arc<IssueRecord>>,
}
