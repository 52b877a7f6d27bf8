//! Upstream fetchers (github_fetcher, forum_fetcher) are out of scope for
//! this crate (§1 Non-goals: "fetching upstream data"). This module owns
//! only the contract a fetcher would need to satisfy to plug into C6: it
//! delivers a normalized record for `Store` to upsert. No HTTP client for
//! GitHub/Discourse is implemented here.

use async_trait::async_trait;

use super::WorkerError;

#[derive(Debug, Clone)]
pub struct NormalizedIssue {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub user_login: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NormalizedForumPost {
    pub topic_id: i64,
    pub title: String,
    pub conversation: String,
    pub slug: String,
}

/// A source of new/updated issues. Implemented by an out-of-scope GitHub
/// client; exists here only so C6's loop set has a slot to schedule one.
#[async_trait]
pub trait IssueFetcher: Send + Sync {
    async fn fetch_page(&self, since: Option<chrono::DateTime<chrono::Utc>>) -> Result<Vec<NormalizedIssue>, WorkerError>;
}

/// A source of new/updated forum posts. Implemented by an out-of-scope
/// Discourse client.
#[async_trait]
pub trait ForumFetcher: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<NormalizedForumPost>, WorkerError>;
}
