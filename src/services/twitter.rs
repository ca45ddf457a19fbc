// src/services/twitter.rs

//! Twitter v2 REST client.
//!
//! Every paginated call returns a [`RawBatch`] shaped like the stream the
//! normalizer expects: for each page, the primary objects (tweets or users)
//! followed by one expansion container built from the page's `includes`
//! and `meta`:
//!
//! ```text
//! {"tweets": [...], "users": [...], "places": [...],
//!  "result_count": 10, "newest_id": "...", "oldest_id": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::models::{ApiConfig, RawBatch};
use crate::services::{FetchError, SearchApi, SearchRequest, UserApi};
use crate::utils::http;

const EXPANSIONS: &str = "entities.mentions.username,in_reply_to_user_id,author_id,geo.place_id,\
referenced_tweets.id.author_id,referenced_tweets.id";
const USER_FIELDS: &str = "created_at,description,entities,id,location,name,pinned_tweet_id,\
profile_image_url,protected,public_metrics,url,username,verified,withheld";
const PLACE_FIELDS: &str = "contained_within,country,country_code,full_name,geo,id,name,place_type";
const TWEET_FIELDS: &str = "author_id,text,context_annotations,conversation_id,created_at,entities,\
geo,in_reply_to_user_id,lang,public_metrics,possibly_sensitive,referenced_tweets,source,withheld";

/// Largest id list accepted by the user lookup endpoint.
const USER_LOOKUP_CHUNK: usize = 100;

/// Which query parameter carries the page token.
#[derive(Debug, Clone, Copy)]
enum PageToken {
    /// Search endpoints
    Next,
    /// User/follow/timeline endpoints
    Pagination,
}

impl PageToken {
    fn param(self) -> &'static str {
        match self {
            PageToken::Next => "next_token",
            PageToken::Pagination => "pagination_token",
        }
    }
}

/// Page size bounds for an endpoint.
#[derive(Debug, Clone, Copy)]
struct PageSize {
    min: u32,
    max: u32,
}

/// Bearer-token client for the v2 API.
pub struct TwitterClient {
    client: Client,
    base_url: String,
    token: String,
    max_rate_limit_waits: u32,
    max_rate_limit_wait: Duration,
}

impl TwitterClient {
    /// Create a client from parts.
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            max_rate_limit_waits: 3,
            max_rate_limit_wait: Duration::from_secs(900),
        }
    }

    /// Create a client from configuration, reading the token from the environment.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let token = std::env::var(&config.bearer_token_env).map_err(|_| {
            AppError::Fetch(FetchError::Credentials(format!(
                "environment variable {} is not set",
                config.bearer_token_env
            )))
        })?;
        let client = http::create_async_client(config)?;

        let mut twitter = Self::new(client, &config.base_url, token);
        twitter.max_rate_limit_waits = config.max_rate_limit_waits;
        twitter.max_rate_limit_wait = Duration::from_secs(config.max_rate_limit_wait_secs);
        Ok(twitter)
    }

    /// Issue one GET, waiting out rate limits, and decode the JSON body.
    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut waits = 0;

        loop {
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(params)
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if waits >= self.max_rate_limit_waits {
                    return Err(FetchError::RateLimited { waits });
                }
                let wait = self.rate_limit_wait(resp.headers());
                log::warn!(
                    "Rate limited on {}, waiting {}s ({}/{})",
                    path,
                    wait.as_secs(),
                    waits + 1,
                    self.max_rate_limit_waits
                );
                tokio::time::sleep(wait).await;
                waits += 1;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                if status == StatusCode::BAD_REQUEST {
                    if let Some(message) = cursor_rejection(&body) {
                        return Err(FetchError::CursorInvalid(message));
                    }
                }
                return Err(FetchError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            return Ok(resp.json().await?);
        }
    }

    /// Time until the rate-limit window resets, bounded by configuration.
    fn rate_limit_wait(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let reset = headers
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        let secs = match reset {
            Some(epoch) => (epoch - Utc::now().timestamp()).max(1) as u64,
            None => 60,
        };
        Duration::from_secs(secs).min(self.max_rate_limit_wait)
    }

    /// Follow page tokens until `max_results` primary objects are collected.
    async fn paginate(
        &self,
        path: &str,
        base_params: Vec<(&str, String)>,
        max_results: u32,
        page_size: PageSize,
        token: PageToken,
    ) -> std::result::Result<RawBatch, FetchError> {
        let mut batch = RawBatch::new();
        let mut collected: u32 = 0;
        let mut next_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(collected);
            let size = remaining.clamp(page_size.min, page_size.max);

            let mut params = base_params.clone();
            params.push(("max_results", size.to_string()));
            if let Some(t) = &next_token {
                params.push((token.param(), t.clone()));
            }

            let page = self.get_json(path, &params).await?;
            let primary = append_page(&page, &mut batch);
            collected = collected.saturating_add(primary as u32);

            next_token = page
                .pointer("/meta/next_token")
                .and_then(Value::as_str)
                .map(String::from);

            log::debug!(
                "{}: page of {} objects, {} collected of max {}",
                path,
                primary,
                collected,
                max_results
            );

            if collected >= max_results || next_token.is_none() || primary == 0 {
                break;
            }
        }

        Ok(batch)
    }

    /// Resolve a username to its numeric user id.
    pub async fn user_id_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<String>, FetchError> {
        let path = format!("/users/by/username/{}", username.trim_start_matches('@'));
        match self.get_json(&path, &[]).await {
            Ok(body) => Ok(body
                .pointer("/data/id")
                .and_then(Value::as_str)
                .map(String::from)),
            Err(FetchError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Look up full user objects by id, 100 per request.
    pub async fn get_users(&self, ids: &[String]) -> std::result::Result<RawBatch, FetchError> {
        let mut batch = RawBatch::new();
        for chunk in ids.chunks(USER_LOOKUP_CHUNK) {
            log::info!(
                "Requesting {} users of {}, {} objects so far",
                chunk.len(),
                ids.len(),
                batch.len()
            );
            let params = vec![
                ("ids", chunk.join(",")),
                ("user.fields", USER_FIELDS.to_string()),
                ("expansions", "pinned_tweet_id".to_string()),
                ("tweet.fields", TWEET_FIELDS.to_string()),
            ];
            let page = self.get_json("/users", &params).await?;
            append_page(&page, &mut batch);
        }
        Ok(batch)
    }

    /// Accounts following `user_id`.
    pub async fn get_followers(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        log::info!("Fetching followers of {}, max {}", user_id, max_results);
        self.paginate(
            &format!("/users/{}/followers", user_id),
            follow_params(),
            max_results,
            PageSize { min: 1, max: 1000 },
            PageToken::Pagination,
        )
        .await
    }

    /// Accounts `user_id` follows.
    pub async fn get_following(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        log::info!("Fetching accounts followed by {}, max {}", user_id, max_results);
        self.paginate(
            &format!("/users/{}/following", user_id),
            follow_params(),
            max_results,
            PageSize { min: 1, max: 1000 },
            PageToken::Pagination,
        )
        .await
    }

    /// Most recent tweets posted by `user_id`.
    pub async fn get_user_timeline(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        log::info!("Fetching timeline of {}, max {}", user_id, max_results);
        self.paginate(
            &format!("/users/{}/tweets", user_id),
            tweet_params(),
            max_results,
            PageSize { min: 5, max: 100 },
            PageToken::Pagination,
        )
        .await
    }
}

#[async_trait]
impl SearchApi for TwitterClient {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<RawBatch, FetchError> {
        log::info!(
            "Searching {:?}: {} per call, max {}{}",
            request.query,
            request.results_per_call,
            request.max_results,
            request
                .since_id
                .as_deref()
                .map(|id| format!(", since {id}"))
                .unwrap_or_default()
        );

        let mut params = tweet_params();
        params.push(("query", request.query.clone()));
        if let Some(since_id) = &request.since_id {
            params.push(("since_id", since_id.clone()));
        }

        // Search pages are capped by the per-call size on top of the API bounds.
        let per_call = request.results_per_call.clamp(10, 100);
        let batch = self
            .paginate(
                "/tweets/search/recent",
                params,
                request.max_results,
                PageSize {
                    min: 10,
                    max: per_call,
                },
                PageToken::Next,
            )
            .await?;

        log::info!("Returned {} objects", batch.len());
        Ok(batch)
    }
}

#[async_trait]
impl UserApi for TwitterClient {
    async fn user_id_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<String>, FetchError> {
        TwitterClient::user_id_by_username(self, username).await
    }

    async fn get_users(&self, ids: &[String]) -> std::result::Result<RawBatch, FetchError> {
        TwitterClient::get_users(self, ids).await
    }

    async fn get_followers(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        TwitterClient::get_followers(self, user_id, max_results).await
    }

    async fn get_following(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        TwitterClient::get_following(self, user_id, max_results).await
    }

    async fn get_user_timeline(
        &self,
        user_id: &str,
        max_results: u32,
    ) -> std::result::Result<RawBatch, FetchError> {
        TwitterClient::get_user_timeline(self, user_id, max_results).await
    }
}

fn tweet_params() -> Vec<(&'static str, String)> {
    vec![
        ("expansions", EXPANSIONS.to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
        ("user.fields", USER_FIELDS.to_string()),
        ("place.fields", PLACE_FIELDS.to_string()),
    ]
}

fn follow_params() -> Vec<(&'static str, String)> {
    vec![
        ("user.fields", USER_FIELDS.to_string()),
        ("expansions", "pinned_tweet_id".to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
    ]
}

/// Append a page's primary objects and its expansion container to `batch`.
///
/// Returns how many primary objects the page carried.
fn append_page(page: &Value, batch: &mut RawBatch) -> usize {
    let primary = match page.get("data") {
        Some(Value::Array(items)) => {
            batch.extend(items.iter().cloned());
            items.len()
        }
        Some(item @ Value::Object(_)) => {
            batch.push(item.clone());
            1
        }
        _ => 0,
    };

    let includes = page.get("includes").and_then(Value::as_object);
    let meta = page.get("meta").and_then(Value::as_object);
    if includes.is_none() && meta.is_none() {
        return primary;
    }

    let mut container = Map::new();
    if let Some(includes) = includes {
        for key in ["tweets", "users", "places"] {
            if let Some(items) = includes.get(key) {
                container.insert(key.to_string(), items.clone());
            }
        }
    }
    if let Some(meta) = meta {
        for key in ["result_count", "newest_id", "oldest_id"] {
            if let Some(value) = meta.get(key) {
                container.insert(key.to_string(), value.clone());
            }
        }
    }
    batch.push(Value::Object(container));
    primary
}

/// Detect a 400 body whose errors name the `since_id` parameter.
fn cursor_rejection(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let errors = parsed.get("errors")?.as_array()?;
    errors.iter().find_map(|error| {
        let names_cursor = error
            .get("parameters")
            .and_then(Value::as_object)
            .is_some_and(|params| params.contains_key("since_id"));
        names_cursor.then(|| {
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("invalid since_id")
                .to_string()
        })
    })
}
