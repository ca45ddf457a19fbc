// src/pipeline/followers.rs

//! Follower/following network capture for one account.

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Record, record_id};
use crate::pipeline::normalize::{NormalizeOptions, normalize};
use crate::services::UserApi;

/// Lists longer than this need confirmation before fetching.
pub const CONFIRM_THRESHOLD: u64 = 300;

/// Direction of a follow relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accounts following the user
    Followers,
    /// Accounts the user follows
    Following,
}

impl Direction {
    /// Profile field holding the id list.
    pub fn field(self) -> &'static str {
        match self {
            Direction::Followers => "followers",
            Direction::Following => "following",
        }
    }

    /// Public metric holding the list length.
    fn metric(self) -> &'static str {
        match self {
            Direction::Followers => "followers_count",
            Direction::Following => "following_count",
        }
    }
}

/// Which lists to capture.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub username: String,
    pub directions: Vec<Direction>,
}

/// Outcome of a capture.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkOutcome {
    /// The username does not resolve to an account
    UserNotFound,
    /// The operator declined a large fetch
    Aborted,
    /// Fetched users followed by the annotated profile
    Fetched(Vec<Record>),
}

/// Size of the list in `direction` according to the profile's metrics.
pub fn list_size(profile: &Record, direction: Direction) -> u64 {
    profile
        .get("public_metrics")
        .and_then(|metrics| metrics.get(direction.metric()))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Fetch the profile and the requested lists.
///
/// `confirm` is asked before any list above [`CONFIRM_THRESHOLD`] is
/// fetched; returning `false` aborts the whole capture.
pub async fn capture_network<F>(
    api: &dyn UserApi,
    options: &NetworkOptions,
    mut confirm: F,
) -> Result<NetworkOutcome>
where
    F: FnMut(Direction, u64) -> Result<bool>,
{
    let Some(user_id) = api.user_id_by_username(&options.username).await? else {
        log::warn!("No account found for {}", options.username);
        return Ok(NetworkOutcome::UserNotFound);
    };

    let lookup = api.get_users(std::slice::from_ref(&user_id)).await?;
    let mut profile = normalize(&lookup, NormalizeOptions::default())
        .users
        .into_iter()
        .find(|u| record_id(u).as_deref() == Some(user_id.as_str()))
        .ok_or_else(|| {
            AppError::validation(format!("profile lookup for {} returned no user", user_id))
        })?;

    let mut users = Vec::new();
    for &direction in &options.directions {
        let size = list_size(&profile, direction);
        log::info!("{} has {} {}", options.username, size, direction.field());
        if size > CONFIRM_THRESHOLD && !confirm(direction, size)? {
            log::info!("Capture of {} aborted by operator", options.username);
            return Ok(NetworkOutcome::Aborted);
        }

        let max = u32::try_from(size).unwrap_or(u32::MAX).max(1);
        let raw = match direction {
            Direction::Followers => api.get_followers(&user_id, max).await?,
            Direction::Following => api.get_following(&user_id, max).await?,
        };
        let fetched = normalize(&raw, NormalizeOptions::default()).users;
        log::info!("Fetched {} {}", fetched.len(), direction.field());

        let ids: Vec<Value> = fetched
            .iter()
            .filter_map(record_id)
            .map(Value::from)
            .collect();
        profile.insert(direction.field().to_string(), Value::Array(ids));
        users.extend(fetched);
    }

    users.push(profile);
    Ok(NetworkOutcome::Fetched(users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawBatch;
    use crate::services::FetchError;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeUsers {
        followers_count: u64,
    }

    fn user(id: &str) -> Value {
        json!({"id": id, "username": format!("user{id}")})
    }

    #[async_trait]
    impl UserApi for FakeUsers {
        async fn user_id_by_username(
            &self,
            username: &str,
        ) -> std::result::Result<Option<String>, FetchError> {
            Ok((username == "known").then(|| "1".to_string()))
        }

        async fn get_users(&self, _ids: &[String]) -> std::result::Result<RawBatch, FetchError> {
            Ok(vec![json!({
                "id": "1",
                "username": "known",
                "public_metrics": {"followers_count": self.followers_count, "following_count": 1}
            })])
        }

        async fn get_followers(
            &self,
            _user_id: &str,
            _max: u32,
        ) -> std::result::Result<RawBatch, FetchError> {
            Ok(vec![user("2"), user("3"), json!({"result_count": 2})])
        }

        async fn get_following(
            &self,
            _user_id: &str,
            _max: u32,
        ) -> std::result::Result<RawBatch, FetchError> {
            Ok(vec![user("4")])
        }

        async fn get_user_timeline(
            &self,
            _user_id: &str,
            _max: u32,
        ) -> std::result::Result<RawBatch, FetchError> {
            Ok(Vec::new())
        }
    }

    fn options(username: &str) -> NetworkOptions {
        NetworkOptions {
            username: username.into(),
            directions: vec![Direction::Followers, Direction::Following],
        }
    }

    #[tokio::test]
    async fn profile_is_annotated_with_both_id_lists() {
        let api = FakeUsers { followers_count: 2 };
        let outcome = capture_network(&api, &options("known"), |_, _| Ok(true))
            .await
            .unwrap();

        let NetworkOutcome::Fetched(users) = outcome else {
            panic!("expected users");
        };
        assert_eq!(users.len(), 4);
        let profile = users.last().unwrap();
        assert_eq!(profile["username"], "known");
        assert_eq!(profile["followers"], json!(["2", "3"]));
        assert_eq!(profile["following"], json!(["4"]));
    }

    #[tokio::test]
    async fn large_lists_need_confirmation() {
        let api = FakeUsers {
            followers_count: 5000,
        };
        let mut asked = Vec::new();
        let outcome = capture_network(&api, &options("known"), |direction, size| {
            asked.push((direction, size));
            Ok(false)
        })
        .await
        .unwrap();

        assert_eq!(outcome, NetworkOutcome::Aborted);
        assert_eq!(asked, vec![(Direction::Followers, 5000)]);
    }

    #[tokio::test]
    async fn small_lists_skip_confirmation() {
        let api = FakeUsers { followers_count: 300 };
        let outcome = capture_network(&api, &options("known"), |_, _| {
            panic!("confirmation should not be requested")
        })
        .await
        .unwrap();
        assert!(matches!(outcome, NetworkOutcome::Fetched(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let api = FakeUsers { followers_count: 0 };
        let outcome = capture_network(&api, &options("ghost"), |_, _| Ok(true))
            .await
            .unwrap();
        assert_eq!(outcome, NetworkOutcome::UserNotFound);
    }
}
