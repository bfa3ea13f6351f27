//! Backport-parity classification across the open and vendor release trains.
//!
//! For every version of a release train, the classifier pulls the backport
//! groups whose fix version matches, scans each group for the earliest
//! qualifying fix on either train, and partitions the roots into report
//! buckets: fixes only the vendor shipped, fixes only the open train
//! shipped, and (in verbose mode) the relative-order breakdown of fixes
//! both trains shipped.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::backports::{BackportEntry, BackportResolver, RELEASE_NOTE_LABEL};
use crate::cache::IssueCache;
use crate::tracker::{FetchResult, IssueKey, IssueRecord};
use crate::versions::{self, Vendor};

/// One release train to account for: a major identifier plus the enumerated
/// minor/update versions belonging to it.
#[derive(Debug, Clone)]
pub struct TrainSpec {
    /// Tracker project the train lives in.
    pub project: String,
    pub major: u32,
    /// Raw version strings; entries of other majors are ignored, shared
    /// markers are excluded up front, malformed entries are skipped with a
    /// warning.
    pub versions: Vec<String>,
}

/// Predicates excluding a root from parity accounting.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    /// Label marking a component the open train does not ship at all.
    pub vendor_only_label: String,
    /// Label declaring the fix won't be taken to the open train.
    pub wont_fix_label: String,
    /// Component prefix absent from the open train of this major, if any.
    pub absent_component_prefix: Option<String>,
}

impl ExclusionRules {
    pub fn for_major(major: u32) -> Self {
        Self {
            vendor_only_label: "openjdk-na".to_string(),
            wont_fix_label: format!("openjdk{major}u-WNF"),
            // The UI toolkit left the open 8 train; no parity exists there.
            absent_component_prefix: (major == 8).then(|| "javafx".to_string()),
        }
    }

    fn excludes(&self, issue: &IssueRecord) -> bool {
        if issue.has_label(&self.vendor_only_label) || issue.has_label(&self.wont_fix_label) {
            return true;
        }
        if let Some(prefix) = &self.absent_component_prefix {
            if issue.components_joined().starts_with(prefix.as_str()) {
                return true;
            }
        }
        false
    }
}

/// Per-root report row.
#[derive(Debug, Clone)]
pub struct ParityEntry {
    pub issue: Arc<IssueRecord>,
    /// Raw earliest open-train fix version; empty when the open train has
    /// no qualifying fix.
    pub first_open_raw: String,
    /// Raw earliest vendor-train fix version; empty when absent.
    pub first_oracle_raw: String,
    /// Space-joined short codes derived from interest labels.
    pub interest_tags: String,
    /// Whether the backport-request label for this train is present.
    pub backport_requested: bool,
}

/// Report rows grouped by earliest qualifying version, then by issue key.
pub type VersionBuckets = BTreeMap<String, BTreeMap<IssueKey, ParityEntry>>;

/// Partitioned parity report for one release train.
#[derive(Debug, Clone, Default)]
pub struct ParityModel {
    only_open: VersionBuckets,
    only_oracle: VersionBuckets,
    exact_open_first: VersionBuckets,
    exact_oracle_first: VersionBuckets,
    exact_unknown: VersionBuckets,
    late_open_first: VersionBuckets,
    late_oracle_first: VersionBuckets,
    shared: BTreeSet<IssueKey>,
    inconsistent: BTreeSet<IssueKey>,
}

impl ParityModel {
    /// Fixes only the open train shipped.
    pub fn only_open(&self) -> &VersionBuckets {
        &self.only_open
    }

    /// Fixes only the vendor train shipped.
    pub fn only_oracle(&self) -> &VersionBuckets {
        &self.only_oracle
    }

    /// Union of both only-sides, grouped by version then issue.
    pub fn get_all(&self) -> VersionBuckets {
        let mut all = self.only_oracle.clone();
        for (version, rows) in &self.only_open {
            let slot = all.entry(version.clone()).or_default();
            for (key, entry) in rows {
                slot.insert(key.clone(), entry.clone());
            }
        }
        all
    }

    /// Numerically equal on both trains, open resolved first.
    pub fn exact_open_first(&self) -> &VersionBuckets {
        &self.exact_open_first
    }

    /// Numerically equal on both trains, vendor resolved first (ties land
    /// here as well).
    pub fn exact_oracle_first(&self) -> &VersionBuckets {
        &self.exact_oracle_first
    }

    /// Numerically equal, but a resolution date is missing on either side.
    pub fn exact_unknown(&self) -> &VersionBuckets {
        &self.exact_unknown
    }

    /// Open train shipped a strictly earlier version.
    pub fn late_open_first(&self) -> &VersionBuckets {
        &self.late_open_first
    }

    /// Vendor train shipped a strictly earlier version.
    pub fn late_oracle_first(&self) -> &VersionBuckets {
        &self.late_oracle_first
    }

    /// Roots excluded because a shared fix version makes them at parity by
    /// definition.
    pub fn shared(&self) -> &BTreeSet<IssueKey> {
        &self.shared
    }

    /// Roots that matched the version-scoped query yet had no qualifying
    /// fix version after filtering.
    pub fn inconsistent(&self) -> &BTreeSet<IssueKey> {
        &self.inconsistent
    }
}

/// Earliest qualifying fix on one train.
struct FirstFix {
    stripped: String,
    raw: String,
    resolved: Option<NaiveDateTime>,
}

/// Builds a [`ParityModel`] for a release train.
pub struct ParityClassifier {
    resolver: BackportResolver,
    rules: ExclusionRules,
    verbose: bool,
}

impl ParityClassifier {
    pub fn new(cache: Arc<IssueCache>, rules: ExclusionRules) -> Self {
        Self {
            resolver: BackportResolver::new(cache),
            rules,
            verbose: false,
        }
    }

    /// Enable the both-trains relative-order buckets.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Classify every root fixed in any version of `train`.
    ///
    /// Versions are processed in the given order; a root is classified the
    /// first time it appears and skipped afterwards, so bucket placement is
    /// mutually exclusive per train.
    pub async fn classify(&self, train: &TrainSpec) -> FetchResult<ParityModel> {
        let mut model = ParityModel::default();
        let mut seen: BTreeSet<IssueKey> = BTreeSet::new();

        for version in &train.versions {
            match versions::parse_major(version) {
                Ok(major) if major == train.major => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!(%err, "skipping malformed train version");
                    continue;
                }
            }
            if versions::classify(version) == Vendor::Shared {
                continue;
            }

            let query = self.version_query(train, version);
            let map = self.resolver.backport_map(&query, true).await?;
            debug!(version, roots = map.len(), "classifying backport groups");

            for (key, entry) in map.iter() {
                if seen.contains(key) || self.rules.excludes(entry.root()) {
                    continue;
                }
                seen.insert(key.clone());
                self.classify_root(train, &mut model, entry);
            }
        }

        debug!(
            only_open = model.only_open.values().map(BTreeMap::len).sum::<usize>(),
            only_oracle = model.only_oracle.values().map(BTreeMap::len).sum::<usize>(),
            shared = model.shared.len(),
            inconsistent = model.inconsistent.len(),
            "parity classification complete"
        );
        Ok(model)
    }

    /// The canned query for one train version: closed or resolved fixes,
    /// minus release notes, vendor-only and won't-fix labels, compatibility
    /// requests, and non-fix resolutions.
    fn version_query(&self, train: &TrainSpec, version: &str) -> String {
        format!(
            "project = {} AND (status in (Closed, Resolved)) \
             AND (labels not in ({}, {}, {}) OR labels is EMPTY) \
             AND (issuetype != CSR) \
             AND (resolution not in (\"Won't Fix\", Duplicate, \"Cannot Reproduce\", \
             \"Not an Issue\", Withdrawn, Other)) \
             AND fixVersion = {}",
            train.project,
            RELEASE_NOTE_LABEL,
            self.rules.vendor_only_label,
            self.rules.wont_fix_label,
            version
        )
    }

    fn classify_root(&self, train: &TrainSpec, model: &mut ParityModel, group: &BackportEntry) {
        let root = group.root();
        let mut is_shared = false;
        let mut first_open: Option<FirstFix> = None;
        let mut first_oracle: Option<FirstFix> = None;

        for member in group.members() {
            for fix_version in &member.fix_versions {
                match versions::parse_major(fix_version) {
                    Ok(major) if major == train.major => {}
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(key = %member.key, %err, "skipping malformed fix version");
                        continue;
                    }
                }

                let vendor = versions::classify(fix_version);
                if vendor == Vendor::Shared {
                    is_shared = true;
                    continue;
                }

                let stripped = versions::strip_vendor(fix_version);
                let slot = match vendor {
                    Vendor::Oracle => &mut first_oracle,
                    _ => &mut first_open,
                };
                let earlier = match slot {
                    None => true,
                    Some(current) => versions::compare(stripped, &current.stripped)
                        .map(|ord| ord == Ordering::Less)
                        .unwrap_or(false),
                };
                if earlier {
                    *slot = Some(FirstFix {
                        stripped: stripped.to_string(),
                        raw: fix_version.clone(),
                        resolved: member.resolution_date,
                    });
                }
            }
        }

        if is_shared {
            // At parity by definition.
            model.shared.insert(root.key.clone());
            return;
        }

        let entry = |open_raw: &str, oracle_raw: &str| ParityEntry {
            issue: Arc::clone(root),
            first_open_raw: open_raw.to_string(),
            first_oracle_raw: oracle_raw.to_string(),
            interest_tags: interest_tags(&root.labels),
            backport_requested: root.has_label(&format!("jdk{}u-fix-request", train.major)),
        };

        match (first_open, first_oracle) {
            (Some(open), None) => {
                insert_row(&mut model.only_open, &open.stripped, root, entry(&open.raw, ""));
            }
            (None, Some(oracle)) => {
                insert_row(
                    &mut model.only_oracle,
                    &oracle.stripped,
                    root,
                    entry("", &oracle.raw),
                );
            }
            (Some(open), Some(oracle)) => {
                if self.verbose {
                    self.classify_both(model, root, &entry(&open.raw, &oracle.raw), open, oracle);
                }
            }
            (None, None) => {
                // Matched the version-scoped query yet carries nothing of
                // this train after filtering.
                warn!(key = %root.key, "inconsistent parity classification, excluding");
                model.inconsistent.insert(root.key.clone());
            }
        }
    }

    fn classify_both(
        &self,
        model: &mut ParityModel,
        root: &Arc<IssueRecord>,
        entry: &ParityEntry,
        open: FirstFix,
        oracle: FirstFix,
    ) {
        let Ok(ord) = versions::compare(&open.stripped, &oracle.stripped) else {
            // Both sides parsed during the scan; nothing to do here.
            return;
        };
        let buckets = match ord {
            Ordering::Equal => match (open.resolved, oracle.resolved) {
                (Some(open_at), Some(oracle_at)) if open_at < oracle_at => {
                    &mut model.exact_open_first
                }
                (Some(_), Some(_)) => &mut model.exact_oracle_first,
                _ => &mut model.exact_unknown,
            },
            Ordering::Less => &mut model.late_open_first,
            Ordering::Greater => &mut model.late_oracle_first,
        };
        insert_row(buckets, &open.stripped, root, entry.clone());
    }
}

fn insert_row(
    buckets: &mut VersionBuckets,
    version: &str,
    root: &Arc<IssueRecord>,
    entry: ParityEntry,
) {
    buckets
        .entry(version.to_string())
        .or_default()
        .insert(root.key.clone(), entry);
}

/// Short codes for downstream-interest labels, sorted and space-joined.
///
/// `<vendor>-interest` labels map through the vendor table (unknown vendors
/// pass through verbatim); critical-request/approved labels collapse to
/// `crit`.
pub fn interest_tags(labels: &[String]) -> String {
    let mut tags = BTreeSet::new();
    for label in labels {
        if let Some(vendor) = label.strip_suffix("-interest") {
            tags.insert(vendor_code(vendor).to_string());
        } else if label.ends_with("-critical-request") || label.ends_with("-critical-approved") {
            tags.insert("crit".to_string());
        }
    }
    tags.into_iter().collect::<Vec<_>>().join(" ")
}

fn vendor_code(vendor: &str) -> &str {
    match vendor {
        "redhat" => "rh",
        "amazon" => "am",
        "azul" => "az",
        "alibaba" => "ab",
        "bellsoft" => "bs",
        "google" => "gg",
        "huawei" => "hw",
        "microsoft" => "ms",
        "sap" => "sap",
        "tencent" => "tc",
        other => other,
    }
}
