//! Fixparity Core Library
//!
//! Tracks fixes across the open and vendor release trains of a large
//! codebase: a memoized single-flight issue cache over a remote tracker, a
//! backport link-graph resolver, a total ordering over release versions,
//! and the parity classifier that partitions fixes into report buckets.

pub mod backports;
pub mod cache;
pub mod parity;
pub mod telemetry;
pub mod tracker;
pub mod versions;

pub use backports::{BackportEntry, BackportMap, BackportResolver, RELEASE_NOTE_LABEL};

pub use cache::promise::{IssuePromise, RetryPolicy, SearchPromise};
pub use cache::{IssueCache, PAGE_SIZE};

pub use parity::{
    interest_tags, ExclusionRules, ParityClassifier, ParityEntry, ParityModel, TrainSpec,
    VersionBuckets,
};

pub use tracker::{
    Comment, FetchError, FetchResult, Fidelity, IssueKey, IssueRecord, Link, LinkDirection,
    RecordError, RestTrackerClient, SearchPage, TrackerClient, TrackerConfig, BACKPORT_LINK,
    RELATES_LINK,
};

pub use versions::{Vendor, VersionError};

pub use telemetry::init_tracing;

/// Fixparity version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
