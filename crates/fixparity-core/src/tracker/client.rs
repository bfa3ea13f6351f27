//! Remote tracker client: the collaborator seam plus its REST implementation.
//!
//! [`TrackerClient`] is the only surface the rest of the crate talks to, so
//! tests plug in stubs and the cache stays transport-agnostic.
//! [`RestTrackerClient`] speaks the JIRA-style REST dialect.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::tracker::error::{FetchError, FetchResult};
use crate::tracker::types::{
    Comment, Fidelity, IssueKey, IssueRecord, Link, LinkDirection, SearchPage,
};

/// Fields populated on a basic (cheap) fetch.
const BASIC_FIELDS: &str =
    "summary,issuetype,created,resolutiondate,resolution,priority,labels,components,fixVersions";

/// Fields populated on a full fetch.
const FULL_FIELDS: &str = "summary,issuetype,created,resolutiondate,resolution,priority,labels,\
     components,fixVersions,description,issuelinks,subtasks,comment";

/// Injectable data-source for remote issue records.
///
/// The query expression is an opaque string passed through verbatim.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Fetch a single issue by key at the given fidelity.
    async fn fetch_issue(&self, key: &str, fidelity: Fidelity) -> FetchResult<IssueRecord>;

    /// Fetch one page of a search, returning the remote's total match count
    /// alongside the page contents.
    async fn search(&self, query: &str, page_size: usize, offset: usize)
        -> FetchResult<SearchPage>;
}

/// Connection settings for the remote tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Tracker base URL.
    pub base_url: String,
    /// Account name for basic auth (optional for anonymous read access).
    pub user: Option<String>,
    /// API token for basic auth.
    pub token: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            base_url: std::env::var("FIXPARITY_URL")
                .unwrap_or_else(|_| "https://bugs.openjdk.org".to_string()),
            user: std::env::var("FIXPARITY_USER").ok(),
            token: std::env::var("FIXPARITY_TOKEN").ok(),
        }
    }
}

impl TrackerConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create a config for a specific tracker instance.
    pub fn new(base_url: &str) -> Self {
        TrackerConfig {
            base_url: base_url.to_string(),
            user: None,
            token: None,
        }
    }

    /// Set basic-auth credentials.
    pub fn with_auth(mut self, user: &str, token: &str) -> Self {
        self.user = Some(user.to_string());
        self.token = Some(token.to_string());
        self
    }
}

/// [`TrackerClient`] over a JIRA-style REST API.
pub struct RestTrackerClient {
    config: TrackerConfig,
    http: reqwest::Client,
}

impl RestTrackerClient {
    pub fn new(config: TrackerConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fixparity/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        RestTrackerClient { config, http }
    }

    pub fn from_env() -> Self {
        Self::new(TrackerConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.config.user, &self.config.token) {
            (Some(user), Some(token)) => req.basic_auth(user, Some(token)),
            _ => req,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
        not_found_key: Option<&str>,
    ) -> FetchResult<T> {
        let req = self.apply_auth(self.http.get(&url).query(query));
        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(key) = not_found_key {
                return Err(FetchError::NotFound {
                    key: key.to_string(),
                });
            }
            return Err(FetchError::Rejected(format!("{url}: 404")));
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient(format!("{url}: {status}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Rejected(format!("{url}: {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| FetchError::Rejected(format!("malformed response from {url}: {e}")))
    }
}

#[async_trait]
impl TrackerClient for RestTrackerClient {
    async fn fetch_issue(&self, key: &str, fidelity: Fidelity) -> FetchResult<IssueRecord> {
        let fields = match fidelity {
            Fidelity::Basic => BASIC_FIELDS,
            Fidelity::Full => FULL_FIELDS,
        };
        debug!(key, ?fidelity, "fetching issue");
        let dto: IssueDto = self
            .get_json(
                self.endpoint(&format!("issue/{key}")),
                &[("fields", fields.to_string())],
                Some(key),
            )
            .await?;
        Ok(dto.into_record())
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> FetchResult<SearchPage> {
        debug!(page_size, offset, "searching issues");
        let dto: SearchDto = self
            .get_json(
                self.endpoint("search"),
                &[
                    ("jql", query.to_string()),
                    ("maxResults", page_size.to_string()),
                    ("startAt", offset.to_string()),
                    ("fields", BASIC_FIELDS.to_string()),
                ],
                None,
            )
            .await?;
        Ok(SearchPage {
            total: dto.total,
            issues: dto
                .issues
                .into_iter()
                .map(|i| Arc::new(i.into_record()))
                .collect(),
        })
    }
}

// Wire DTOs. The remote nests almost everything under `fields` and wraps
// names in `{ "name": ... }` objects.

#[derive(Debug, Deserialize)]
struct IssueDto {
    key: String,
    #[serde(default)]
    fields: FieldsDto,
}

#[derive(Debug, Default, Deserialize)]
struct FieldsDto {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default, rename = "resolutiondate")]
    resolution_date: Option<String>,
    #[serde(default)]
    priority: Option<NamedDto>,
    #[serde(default, rename = "issuetype")]
    issue_type: Option<NamedDto>,
    #[serde(default)]
    resolution: Option<NamedDto>,
    #[serde(default)]
    components: Vec<NamedDto>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default, rename = "fixVersions")]
    fix_versions: Vec<NamedDto>,
    #[serde(default, rename = "issuelinks")]
    issue_links: Vec<LinkDto>,
    #[serde(default)]
    subtasks: Vec<KeyDto>,
    #[serde(default)]
    comment: Option<CommentsDto>,
}

#[derive(Debug, Deserialize)]
struct NamedDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct KeyDto {
    key: String,
}

#[derive(Debug, Deserialize)]
struct LinkDto {
    #[serde(rename = "type")]
    link_type: NamedDto,
    #[serde(default, rename = "inwardIssue")]
    inward: Option<KeyDto>,
    #[serde(default, rename = "outwardIssue")]
    outward: Option<KeyDto>,
}

#[derive(Debug, Deserialize)]
struct CommentsDto {
    #[serde(default)]
    comments: Vec<CommentDto>,
}

#[derive(Debug, Deserialize)]
struct CommentDto {
    #[serde(default)]
    author: Option<AuthorDto>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct AuthorDto {
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchDto {
    total: usize,
    #[serde(default)]
    issues: Vec<IssueDto>,
}

impl IssueDto {
    fn into_record(self) -> IssueRecord {
        let key = IssueKey::new(&self.key);
        let f = self.fields;

        let mut links = Vec::with_capacity(f.issue_links.len());
        for l in f.issue_links {
            // A link object names exactly one far end; which field it sits
            // in encodes the direction.
            let (direction, far) = match (l.inward, l.outward) {
                (Some(k), _) => (LinkDirection::Inbound, k),
                (None, Some(k)) => (LinkDirection::Outbound, k),
                (None, None) => {
                    warn!(key = %key, "issue link without a far end, skipping");
                    continue;
                }
            };
            links.push(Link {
                link_type: l.link_type.name,
                direction,
                target: IssueKey::new(far.key),
            });
        }

        IssueRecord {
            summary: f.summary.unwrap_or_default(),
            description: f.description,
            issue_type: f.issue_type.map(|n| n.name),
            priority: f.priority.map(|n| n.name),
            resolution: f.resolution.map(|n| n.name),
            created: f.created.as_deref().and_then(|s| parse_created(&key, s)),
            resolution_date: f
                .resolution_date
                .as_deref()
                .and_then(|s| parse_resolution_date(&key, s)),
            components: f.components.into_iter().map(|n| n.name).collect(),
            labels: f.labels,
            fix_versions: f.fix_versions.into_iter().map(|n| n.name).collect(),
            links,
            subtasks: f.subtasks.into_iter().map(|k| IssueKey::new(k.key)).collect(),
            comments: f
                .comment
                .map(|c| {
                    c.comments
                        .into_iter()
                        .map(|c| Comment {
                            author: c
                                .author
                                .and_then(|a| a.name.or(a.display_name))
                                .unwrap_or_default(),
                            body: c.body,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            key,
        }
    }
}

fn parse_created(key: &IssueKey, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z") {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            warn!(key = %key, raw, "unparseable creation date");
            None
        }
    }
}

/// The remote appends fractional seconds and an offset; the report model
/// only needs the local wall-clock part.
fn parse_resolution_date(key: &IssueKey, raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.split('.').next().unwrap_or(raw);
    match NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        Ok(dt) => Some(dt),
        Err(_) => {
            warn!(key = %key, raw, "unparseable resolution date");
            None
        }
    }
}
