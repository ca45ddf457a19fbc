//! Service layer for the crawler application.
//!
//! This module contains the upstream API integration:
//! - The fetch capability consumed by the crawl cycle (`SearchApi`)
//! - User lookups behind the follower and timeline tools (`UserApi`)
//! - Its typed failure modes (`FetchError`)
//! - The v2 REST implementation (`TwitterClient`)

mod twitter;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RawBatch;

pub use twitter::TwitterClient;

/// Parameters for one search fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search expression
    pub query: String,
    /// Upper bound on tweets collected across all pages
    pub max_results: u32,
    /// Tweets requested per network call
    pub results_per_call: u32,
    /// Only return tweets newer than this id
    pub since_id: Option<String>,
}

impl SearchRequest {
    /// The same request with the cursor dropped.
    pub fn without_cursor(&self) -> Self {
        Self {
            since_id: None,
            ..self.clone()
        }
    }
}

/// Coarse classification the crawl cycle branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The resumption cursor was rejected; retrying without it may succeed
    CursorInvalid,
    /// Anything else
    Other,
}

/// Upstream fetch failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Cursor rejected by upstream: {0}")]
    CursorInvalid(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {waits} waits")]
    RateLimited { waits: u32 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::CursorInvalid(_) => FetchErrorKind::CursorInvalid,
            _ => FetchErrorKind::Other,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// The search capability the crawl cycle drives.
///
/// Implementations may wait out rate limits internally; that latency simply
/// extends the cycle.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<RawBatch, FetchError>;
}

/// User-centric lookups used by the one-shot tools.
///
/// Batches come back in the same page-plus-container shape as search.
#[async_trait]
pub trait UserApi: Send + Sync {
    /// Numeric id for a username, `None` when the account does not exist.
    async fn user_id_by_username(&self, username: &str) -> Result<Option<String>, FetchError>;

    async fn get_users(&self, ids: &[String]) -> Result<RawBatch, FetchError>;

    async fn get_followers(&self, user_id: &str, max_results: u32)
    -> Result<RawBatch, FetchError>;

    async fn get_following(&self, user_id: &str, max_results: u32)
    -> Result<RawBatch, FetchError>;

    async fn get_user_timeline(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> Result<RawBatch, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cursor_errors_are_retryable() {
        assert_eq!(
            FetchError::CursorInvalid("since_id".into()).kind(),
            FetchErrorKind::CursorInvalid
        );
        assert_eq!(
            FetchError::Api {
                status: 400,
                message: "bad query".into()
            }
            .kind(),
            FetchErrorKind::Other
        );
        assert_eq!(
            FetchError::RateLimited { waits: 3 }.kind(),
            FetchErrorKind::Other
        );
    }

    #[test]
    fn without_cursor_keeps_sizing() {
        let request = SearchRequest {
            query: "#audit".into(),
            max_results: 40,
            results_per_call: 40,
            since_id: Some("12".into()),
        };
        let retry = request.without_cursor();
        assert_eq!(retry.since_id, None);
        assert_eq!(retry.max_results, 40);
        assert_eq!(retry.query, "#audit");
    }
}
