//! GitHub Issues Fetcher
//!
//! Each wishlist is a GitHub issue carrying the wishlist label. Labels encode
//! the rest of the record:
//!
//! | Label            | Field                  |
//! |------------------|------------------------|
//! | `approved`       | `approved = true`      |
//! | `tech:<name>`    | `tags += name`         |
//! | `service:<name>` | `services += name`     |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::ports::SourceFetcher;
use crate::domain::WishlistRecord;
use crate::error::{Error, Result};

const APPROVED_LABEL: &str = "approved";
const TECH_PREFIX: &str = "tech:";
const SERVICE_PREFIX: &str = "service:";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the GitHub fetcher
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// REST API base URL
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    /// Label selecting wishlist issues
    pub label: String,
    /// Optional bearer token (raises the rate limit)
    pub token: Option<String>,
    /// Issues per page (GitHub caps this at 100)
    pub per_page: u32,
    /// Stop paginating after this many pages
    pub max_pages: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: "oss-wishlist".to_string(),
            repo: "wishlists".to_string(),
            label: "wishlist".to_string(),
            token: None,
            per_page: 100,
            max_pages: 10,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl GithubConfig {
    fn issues_url(&self, page: u32) -> String {
        format!(
            "{}/repos/{}/{}/issues?labels={}&state=open&per_page={}&page={}",
            self.api_url.trim_end_matches('/'),
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo),
            urlencoding::encode(&self.label),
            self.per_page,
            page
        )
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Issue {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    user: Option<IssueUser>,
    #[serde(default)]
    labels: Vec<IssueLabel>,
    /// Present only on pull requests, which the issues endpoint also lists
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IssueUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct IssueLabel {
    name: String,
}

impl Issue {
    fn into_record(self) -> Option<WishlistRecord> {
        if self.pull_request.is_some() {
            return None;
        }

        let mut record = WishlistRecord::new(self.number, self.title);
        record.url = self.html_url;
        record.maintainer = self.user.map(|u| u.login).unwrap_or_default();
        record.created_at = self.created_at;
        record.updated_at = self.updated_at;

        for label in self.labels {
            let name = label.name.trim();
            if name.eq_ignore_ascii_case(APPROVED_LABEL) {
                record.approved = true;
            } else if let Some(tech) = name.strip_prefix(TECH_PREFIX) {
                record.tags.insert(tech.trim().to_lowercase());
            } else if let Some(service) = name.strip_prefix(SERVICE_PREFIX) {
                record.services.insert(service.trim().to_lowercase());
            }
        }

        Some(record)
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Lists wishlist issues through the GitHub REST API
#[derive(Debug)]
pub struct GithubIssuesFetcher {
    config: GithubConfig,
    client: Client,
}

impl GithubIssuesFetcher {
    /// Create a new fetcher
    pub fn new(config: GithubConfig) -> Result<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(Error::Config(
                "GitHub owner and repo must both be set".to_string(),
            ));
        }
        if config.per_page == 0 || config.per_page > 100 {
            return Err(Error::Config(format!(
                "GitHub per_page must be within 1..=100, got {}",
                config.per_page
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Issue>> {
        let url = self.config.issues_url(page);
        debug!(page, "requesting GitHub issues page");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("wishcache/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(Error::GithubConnection)?;

        if !response.status().is_success() {
            return Err(Error::GithubResponse(format!(
                "issues request failed with status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::GithubResponse(format!("invalid issues payload: {}", e)))
    }
}

#[async_trait]
impl SourceFetcher for GithubIssuesFetcher {
    #[instrument(skip(self), fields(repo = %format!("{}/{}", self.config.owner, self.config.repo)))]
    async fn fetch_records(&self) -> Result<Vec<WishlistRecord>> {
        let mut records = Vec::new();

        for page in 1..=self.config.max_pages {
            let issues = self.fetch_page(page).await?;
            let count = issues.len();
            records.extend(issues.into_iter().filter_map(Issue::into_record));

            if count < self.config.per_page as usize {
                break;
            }
            if page == self.config.max_pages {
                warn!(
                    max_pages = self.config.max_pages,
                    "GitHub pagination cap reached, results may be truncated"
                );
            }
        }

        debug!(records = records.len(), "fetched wishlist issues");
        Ok(records)
    }

    fn name(&self) -> &str {
        "github"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn issue_json(extra: &str) -> String {
        format!(
            r#"{{
                "number": 42,
                "title": "Help us ship 1.0",
                "html_url": "https://github.com/oss-wishlist/wishlists/issues/42",
                "user": {{ "login": "maintainer" }},
                "labels": [
                    {{ "name": "wishlist" }},
                    {{ "name": "approved" }},
                    {{ "name": "tech:Rust" }},
                    {{ "name": "service: security-audit" }}
                ],
                "created_at": "2024-01-02T03:04:05Z",
                "updated_at": "2024-02-03T04:05:06Z"
                {}
            }}"#,
            extra
        )
    }

    #[test]
    fn test_github_config_default() {
        let config = GithubConfig::default();

        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.label, "wishlist");
        assert_eq!(config.per_page, 100);
        assert_eq!(config.max_pages, 10);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_issues_url_is_encoded() {
        let config = GithubConfig {
            api_url: "https://ghe.example.com/api/v3/".to_string(),
            label: "good wishlist".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.issues_url(3),
            "https://ghe.example.com/api/v3/repos/oss-wishlist/wishlists/issues\
             ?labels=good%20wishlist&state=open&per_page=100&page=3"
        );
    }

    #[test]
    fn test_issue_maps_to_record() {
        let issue: Issue = serde_json::from_str(&issue_json("")).unwrap();
        let record = issue.into_record().unwrap();

        assert_eq!(record.id, 42);
        assert_eq!(record.maintainer, "maintainer");
        assert!(record.approved);
        assert!(record.tags.contains("rust"));
        assert!(record.services.contains("security-audit"));
        assert!(!record.tags.contains("wishlist"));
        assert_eq!(record.created_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_pull_requests_are_skipped() {
        let json = issue_json(r#", "pull_request": { "url": "https://example.com" }"#);
        let issue: Issue = serde_json::from_str(&json).unwrap();

        assert!(issue.into_record().is_none());
    }

    #[test]
    fn test_unlabelled_issue_is_pending() {
        let issue: Issue = serde_json::from_str(
            r#"{
                "number": 7,
                "title": "t",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let record = issue.into_record().unwrap();

        assert!(!record.approved);
        assert!(record.tags.is_empty());
        assert!(record.maintainer.is_empty());
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let missing_repo = GithubConfig {
            repo: String::new(),
            ..Default::default()
        };
        assert_matches!(GithubIssuesFetcher::new(missing_repo), Err(Error::Config(_)));

        let oversized = GithubConfig {
            per_page: 500,
            ..Default::default()
        };
        assert_matches!(GithubIssuesFetcher::new(oversized), Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_connection_error() {
        let fetcher = GithubIssuesFetcher::new(GithubConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = fetcher.fetch_records().await.unwrap_err();
        assert!(err.is_retryable());
        assert_matches!(err, Error::GithubConnection(_));
    }
}
