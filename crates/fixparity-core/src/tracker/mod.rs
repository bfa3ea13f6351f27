//! Remote tracker integration: data model, client seam, error taxonomy.

pub mod client;
pub mod error;
pub mod types;

pub use client::{RestTrackerClient, TrackerClient, TrackerConfig};
pub use error::{FetchError, FetchResult};
pub use types::{
    Comment, Fidelity, IssueKey, IssueRecord, Link, LinkDirection, RecordError, SearchPage,
    BACKPORT_LINK, RELATES_LINK,
};
