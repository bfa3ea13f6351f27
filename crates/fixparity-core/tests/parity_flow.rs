//! End-to-end parity classification against a scripted tracker stub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use fixparity_core::{
    BackportResolver, ExclusionRules, FetchError, FetchResult, Fidelity, IssueCache, IssueKey,
    IssueRecord, Link, LinkDirection, ParityClassifier, ParityModel, RetryPolicy, SearchPage,
    TrackerClient, TrainSpec, BACKPORT_LINK,
};

/// Tracker stub: fixed record set plus a script mapping each queried fix
/// version to the keys the remote would match.
struct ScriptedTracker {
    records: HashMap<String, IssueRecord>,
    queries: HashMap<String, Vec<String>>,
    fetch_calls: AtomicUsize,
}

impl ScriptedTracker {
    fn new(records: Vec<IssueRecord>, queries: Vec<(&str, Vec<&str>)>) -> Arc<Self> {
        Arc::new(Self {
            records: records
                .into_iter()
                .map(|r| (r.key.as_str().to_string(), r))
                .collect(),
            queries: queries
                .into_iter()
                .map(|(v, keys)| {
                    (
                        v.to_string(),
                        keys.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    /// The classifier embeds the version as the trailing query term.
    fn version_of(query: &str) -> &str {
        query
            .rsplit("fixVersion = ")
            .next()
            .unwrap_or_default()
            .trim()
    }
}

#[async_trait]
impl TrackerClient for ScriptedTracker {
    async fn fetch_issue(&self, key: &str, _fidelity: Fidelity) -> FetchResult<IssueRecord> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .get(key)
            .cloned()
            .ok_or(FetchError::NotFound {
                key: key.to_string(),
            })
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> FetchResult<SearchPage> {
        let keys = self
            .queries
            .get(Self::version_of(query))
            .cloned()
            .unwrap_or_default();
        let issues = keys
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|k| Arc::new(self.records[k].clone()))
            .collect();
        Ok(SearchPage {
            total: keys.len(),
            issues,
        })
    }
}

fn issue(key: &str) -> IssueRecord {
    IssueRecord {
        key: IssueKey::new(key),
        summary: format!("summary of {key}"),
        description: None,
        issue_type: Some("Bug".to_string()),
        priority: Some("P3".to_string()),
        resolution: Some("Fixed".to_string()),
        created: None,
        resolution_date: None,
        components: Vec::new(),
        labels: Vec::new(),
        fix_versions: Vec::new(),
        links: Vec::new(),
        subtasks: Vec::new(),
        comments: Vec::new(),
    }
}

fn with_fix(mut rec: IssueRecord, fix: &str) -> IssueRecord {
    rec.fix_versions.push(fix.to_string());
    rec
}

fn with_link(mut rec: IssueRecord, direction: LinkDirection, target: &str) -> IssueRecord {
    rec.links.push(Link {
        link_type: BACKPORT_LINK.to_string(),
        direction,
        target: IssueKey::new(target),
    });
    rec
}

fn resolved_at(mut rec: IssueRecord, ts: &str) -> IssueRecord {
    rec.resolution_date =
        Some(NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S").expect("fixture timestamp"));
    rec
}

fn train(major: u32, versions: &[&str]) -> TrainSpec {
    TrainSpec {
        project: "JDK".to_string(),
        major,
        versions: versions.iter().map(|v| v.to_string()).collect(),
    }
}

fn classifier(client: Arc<ScriptedTracker>, major: u32) -> ParityClassifier {
    ParityClassifier::new(
        Arc::new(IssueCache::new(client)),
        ExclusionRules::for_major(major),
    )
}

/// How many report buckets hold `key`; partition demands at most one.
fn bucket_count(model: &ParityModel, key: &IssueKey) -> usize {
    let in_buckets = |buckets: &fixparity_core::VersionBuckets| {
        buckets.values().filter(|rows| rows.contains_key(key)).count()
    };
    in_buckets(model.only_open())
        + in_buckets(model.only_oracle())
        + usize::from(model.shared().contains(key))
        + usize::from(model.inconsistent().contains(key))
}

#[tokio::test]
async fn test_exact_parity_when_both_trains_ship_equal_versions() {
    // Root fixed in the open train at 11.0.9; its backport child carries the
    // vendor's numerically equal 11.0.9-oracle.
    let root = resolved_at(
        with_link(
            with_fix(issue("JDK-8000001"), "11.0.9"),
            LinkDirection::Outbound,
            "JDK-8000002",
        ),
        "2021-09-01T10:00:00",
    );
    let child = resolved_at(
        with_link(
            with_fix(issue("JDK-8000002"), "11.0.9-oracle"),
            LinkDirection::Inbound,
            "JDK-8000001",
        ),
        "2021-09-14T10:00:00",
    );

    let client = ScriptedTracker::new(
        vec![root, child],
        vec![("11.0.9", vec!["JDK-8000001"])],
    );
    let model = classifier(client, 11)
        .verbose(true)
        .classify(&train(11, &["11.0.9"]))
        .await
        .expect("classify");

    // Both trains shipped: neither only-bucket may hold the root.
    let key = IssueKey::new("JDK-8000001");
    assert_eq!(bucket_count(&model, &key), 0);

    let rows = model
        .exact_open_first()
        .get("11.0.9")
        .expect("exact bucket keyed by stripped version");
    let entry = rows.get(&key).expect("root entry");
    assert_eq!(entry.first_open_raw, "11.0.9");
    assert_eq!(entry.first_oracle_raw, "11.0.9-oracle");
}

#[tokio::test]
async fn test_open_only_fix_lands_in_only_open_bucket() {
    let lone = with_fix(issue("JDK-8000010"), "8u321");
    let client = ScriptedTracker::new(vec![lone], vec![("8u321", vec!["JDK-8000010"])]);

    let model = classifier(client, 8)
        .classify(&train(8, &["8u321"]))
        .await
        .expect("classify");

    let key = IssueKey::new("JDK-8000010");
    assert_eq!(bucket_count(&model, &key), 1);
    let rows = model.only_open().get("8u321").expect("bucket keyed 8u321");
    let entry = rows.get(&key).expect("entry");
    assert_eq!(entry.first_open_raw, "8u321");
    assert!(entry.first_oracle_raw.is_empty());
}

#[tokio::test]
async fn test_oracle_only_fix_lands_in_only_oracle_bucket() {
    let root = with_link(
        issue("JDK-8000020"),
        LinkDirection::Outbound,
        "JDK-8000021",
    );
    let child = with_link(
        with_fix(issue("JDK-8000021"), "11.0.12-oracle"),
        LinkDirection::Inbound,
        "JDK-8000020",
    );
    // The root itself shipped in a different major; only the child counts
    // for train 11.
    let root = with_fix(root, "17");

    let client = ScriptedTracker::new(
        vec![root, child],
        vec![("11.0.12-oracle", vec!["JDK-8000021"])],
    );
    let model = classifier(client, 11)
        .classify(&train(11, &["11.0.12-oracle"]))
        .await
        .expect("classify");

    let key = IssueKey::new("JDK-8000020");
    assert_eq!(bucket_count(&model, &key), 1);
    let rows = model
        .only_oracle()
        .get("11.0.12")
        .expect("bucket keyed by stripped version");
    assert_eq!(
        rows.get(&key).expect("entry").first_oracle_raw,
        "11.0.12-oracle"
    );
}

#[tokio::test]
async fn test_shared_fix_version_excludes_root() {
    let root = with_link(
        with_fix(issue("JDK-8000030"), "11.0.3"),
        LinkDirection::Outbound,
        "JDK-8000031",
    );
    let child = with_link(
        with_fix(issue("JDK-8000031"), "11.0.1"),
        LinkDirection::Inbound,
        "JDK-8000030",
    );

    let client = ScriptedTracker::new(
        vec![root, child],
        vec![("11.0.3", vec!["JDK-8000030"])],
    );
    let model = classifier(client, 11)
        .classify(&train(11, &["11.0.3"]))
        .await
        .expect("classify");

    let key = IssueKey::new("JDK-8000030");
    assert!(model.shared().contains(&key));
    assert_eq!(bucket_count(&model, &key), 1);
}

#[tokio::test]
async fn test_query_hit_without_qualifying_fix_is_inconsistent() {
    // The remote matched this root for an 11-train version, yet its only
    // fix version belongs to another major.
    let stray = with_fix(issue("JDK-8000040"), "17.0.4");
    let client = ScriptedTracker::new(vec![stray], vec![("11.0.9", vec!["JDK-8000040"])]);

    let model = classifier(client, 11)
        .classify(&train(11, &["11.0.9"]))
        .await
        .expect("classify");

    let key = IssueKey::new("JDK-8000040");
    assert!(model.inconsistent().contains(&key));
    assert_eq!(bucket_count(&model, &key), 1);
}

#[tokio::test]
async fn test_root_is_classified_once_across_versions() {
    // The same root matches the queries of two train versions; it must be
    // classified on the first hit, and its records fetched exactly once.
    let root = with_fix(with_fix(issue("JDK-8000050"), "11.0.9"), "11.0.10");
    let client = ScriptedTracker::new(
        vec![root],
        vec![
            ("11.0.9", vec!["JDK-8000050"]),
            ("11.0.10", vec!["JDK-8000050"]),
        ],
    );

    let model = classifier(client.clone(), 11)
        .classify(&train(11, &["11.0.9", "11.0.10"]))
        .await
        .expect("classify");

    let key = IssueKey::new("JDK-8000050");
    assert_eq!(bucket_count(&model, &key), 1);
    // Earliest open fix keys the bucket.
    assert!(model.only_open().contains_key("11.0.9"));
    assert!(!model.only_open().contains_key("11.0.10"));
    // One full fetch for the root, shared across both version passes.
    assert_eq!(client.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_excluded_labels_keep_root_out_of_every_bucket() {
    let mut root = with_fix(issue("JDK-8000060"), "11.0.9");
    root.labels = vec!["openjdk11u-WNF".to_string()];

    let client = ScriptedTracker::new(vec![root], vec![("11.0.9", vec!["JDK-8000060"])]);
    let model = classifier(client, 11)
        .classify(&train(11, &["11.0.9"]))
        .await
        .expect("classify");

    assert_eq!(bucket_count(&model, &IssueKey::new("JDK-8000060")), 0);
}

#[tokio::test]
async fn test_backport_request_flag_and_interest_tags_surface() {
    let mut root = with_fix(issue("JDK-8000070"), "11.0.9");
    root.labels = vec![
        "jdk11u-fix-request".to_string(),
        "redhat-interest".to_string(),
    ];

    let client = ScriptedTracker::new(vec![root], vec![("11.0.9", vec!["JDK-8000070"])]);
    let model = classifier(client, 11)
        .classify(&train(11, &["11.0.9"]))
        .await
        .expect("classify");

    let entry = model
        .only_open()
        .get("11.0.9")
        .and_then(|rows| rows.get(&IssueKey::new("JDK-8000070")))
        .expect("entry");
    assert!(entry.backport_requested);
    assert_eq!(entry.interest_tags, "rh");
}

/// Tracker that always fails with a transient error.
struct DownTracker {
    attempts: AtomicUsize,
}

#[async_trait]
impl TrackerClient for DownTracker {
    async fn fetch_issue(&self, _key: &str, _fidelity: Fidelity) -> FetchResult<IssueRecord> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Transient("service unavailable".to_string()))
    }

    async fn search(
        &self,
        _query: &str,
        _page_size: usize,
        _offset: usize,
    ) -> FetchResult<SearchPage> {
        Err(FetchError::Transient("service unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_retry_exhaustion_reaches_every_claimant() {
    let client = Arc::new(DownTracker {
        attempts: AtomicUsize::new(0),
    });
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(2),
        multiplier: 2.0,
    };
    let cache = Arc::new(IssueCache::with_retry(client.clone(), retry));

    let promise = cache.issue(&IssueKey::new("JDK-1"), Fidelity::Full);
    let (a, b) = tokio::join!(promise.claim(), promise.claim());
    assert!(matches!(a, Err(FetchError::RetriesExhausted { .. })));
    assert!(matches!(b, Err(FetchError::RetriesExhausted { .. })));
    // Two attempts total, not two per claimant.
    assert_eq!(client.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resolver_fatal_error_aborts_run() {
    let client = Arc::new(DownTracker {
        attempts: AtomicUsize::new(0),
    });
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(2),
        multiplier: 2.0,
    };
    let cache = Arc::new(IssueCache::with_retry(client, retry));
    let resolver = BackportResolver::new(cache);

    let err = resolver
        .backport_map("project = JDK AND fixVersion = 11.0.9", true)
        .await
        .expect_err("search never succeeds");
    assert!(matches!(err, FetchError::RetriesExhausted { .. }));
}
