// src/pipeline/normalize.rs

//! Result normalization.
//!
//! Turns a raw batch of heterogeneous API objects into flat tweet and user
//! lists:
//!
//! - A top-level object with a `text` field is a tweet.
//! - A top-level object with a `username` field is a user.
//! - An object with `tweets`/`users` arrays is an expansion container; its
//!   nested items are flattened in when they look like tweets/users, and its
//!   `result_count` feeds the total.

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime};
use serde_json::Value;

use crate::models::{Counts, NormalizedBatch, RawBatch, Record, record_id};

/// Field stamped onto every tweet and user.
pub const FETCHED_TIMESTAMP: &str = "fetched_timestamp";

/// Options controlling normalization.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Collapse tweets sharing an id, keeping the last-seen instance
    pub dedupe: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { dedupe: true }
    }
}

fn is_tweet(record: &Record) -> bool {
    record.contains_key("text")
}

fn is_user(record: &Record) -> bool {
    record.contains_key("username")
}

/// Nested records under `key` of a container that satisfy `accept`.
fn nested<'a>(
    container: &'a Record,
    key: &str,
    accept: fn(&Record) -> bool,
) -> impl Iterator<Item = &'a Record> {
    container
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter(move |r| accept(r))
}

/// ISO-8601 rendering used for [`FETCHED_TIMESTAMP`].
pub fn fetched_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Normalize `batch`, stamping records with the current local time.
pub fn normalize(batch: &RawBatch, options: NormalizeOptions) -> NormalizedBatch {
    let fetched_at = fetched_timestamp(Local::now().naive_local());
    normalize_at(batch, options, &fetched_at)
}

/// Normalize `batch`, stamping records with `fetched_at`.
///
/// Pure: the same batch and timestamp always produce the same output.
pub fn normalize_at(batch: &RawBatch, options: NormalizeOptions, fetched_at: &str) -> NormalizedBatch {
    let objects: Vec<&Record> = batch.iter().filter_map(Value::as_object).collect();

    let outer_tweets: Vec<&Record> = objects.iter().copied().filter(|r| is_tweet(r)).collect();
    let expanded_tweets: Vec<&Record> = objects
        .iter()
        .flat_map(|r| nested(r, "tweets", is_tweet))
        .collect();
    log::debug!(
        "Found {} tweets in the outer list and {} in expansion objects",
        outer_tweets.len(),
        expanded_tweets.len()
    );

    let outer_users: Vec<&Record> = objects.iter().copied().filter(|r| is_user(r)).collect();
    let expanded_users: Vec<&Record> = objects
        .iter()
        .flat_map(|r| nested(r, "users", is_user))
        .collect();
    log::debug!(
        "Found {} users in the outer list and {} in expansion objects",
        outer_users.len(),
        expanded_users.len()
    );

    let mut counts = Counts {
        total: total_result_count(&objects),
        deduped: 0,
    };

    let mut tweets: Vec<Record> = outer_tweets
        .into_iter()
        .chain(expanded_tweets)
        .map(|r| stamped(r, fetched_at))
        .collect();
    if options.dedupe {
        tweets = dedupe_tweets(tweets);
        counts.deduped = tweets.len() as u64;
    }

    if !tweets.is_empty() && counts.total == 0 {
        log::warn!(
            "{} tweets normalized but no expansion object reported a result_count; quota usage will be undercounted",
            tweets.len()
        );
    }

    let users: Vec<Record> = outer_users
        .into_iter()
        .chain(expanded_users)
        .map(|r| stamped(r, fetched_at))
        .collect();

    log::info!(
        "Normalized {} tweets and {} users (total reported {})",
        tweets.len(),
        users.len(),
        counts.total
    );

    NormalizedBatch {
        tweets,
        users,
        counts,
    }
}

/// Sum of the `result_count` fields reported by expansion containers.
fn total_result_count(objects: &[&Record]) -> u64 {
    objects
        .iter()
        .filter_map(|r| r.get("result_count"))
        .filter_map(Value::as_u64)
        .sum()
}

fn stamped(record: &Record, fetched_at: &str) -> Record {
    let mut record = record.clone();
    record.insert(FETCHED_TIMESTAMP.to_string(), Value::from(fetched_at));
    record
}

/// Collapse tweets sharing an id.
///
/// Each id keeps the position of its first appearance and the content of its
/// last. Tweets without an id are passed through untouched.
pub fn dedupe_tweets(tweets: Vec<Record>) -> Vec<Record> {
    let before = tweets.len();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Record> = Vec::with_capacity(before);

    for tweet in tweets {
        match record_id(&tweet) {
            Some(id) => match positions.get(&id) {
                Some(&pos) => unique[pos] = tweet,
                None => {
                    positions.insert(id, unique.len());
                    unique.push(tweet);
                }
            },
            None => unique.push(tweet),
        }
    }

    log::debug!("Deduplicated {} tweets down to {}", before, unique.len());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const AT: &str = "2024-01-05T10:00:00.000000";

    fn batch(values: Vec<Value>) -> RawBatch {
        values
    }

    #[test]
    fn later_duplicate_wins_and_counts_come_from_containers() {
        let raw = batch(vec![
            json!({"id": "5", "text": "a"}),
            json!({"tweets": [{"id": "5", "text": "a-dup"}], "result_count": 2}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);

        assert_eq!(out.tweets.len(), 1);
        assert_eq!(out.tweets[0]["id"], "5");
        assert_eq!(out.tweets[0]["text"], "a-dup");
        assert_eq!(out.counts.total, 2);
        assert_eq!(out.counts.deduped, 1);
    }

    #[test]
    fn dedupe_keeps_one_tweet_per_id() {
        let raw = batch(vec![
            json!({"id": "1", "text": "x"}),
            json!({"id": "2", "text": "y"}),
            json!({"id": "1", "text": "x2"}),
            json!({"id": "3", "text": "z"}),
            json!({"tweets": [{"id": "2", "text": "y2"}, {"id": "4", "text": "w"}], "result_count": 4}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);

        let ids: Vec<&str> = out.tweets.iter().map(|t| t["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(out.tweets[0]["text"], "x2");
        assert_eq!(out.tweets[1]["text"], "y2");
        assert!(out.counts.total >= out.counts.deduped);
    }

    #[test]
    fn dedupe_can_be_disabled() {
        let raw = batch(vec![
            json!({"id": "1", "text": "x"}),
            json!({"id": "1", "text": "x"}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions { dedupe: false }, AT);
        assert_eq!(out.tweets.len(), 2);
        assert_eq!(out.counts.deduped, 0);
    }

    #[test]
    fn users_come_from_outer_list_and_expansions_without_dedupe() {
        let raw = batch(vec![
            json!({"id": "9", "username": "nine"}),
            json!({"users": [{"id": "9", "username": "nine"}, {"id": "8"}], "result_count": 0}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);

        assert!(out.tweets.is_empty());
        assert_eq!(out.users.len(), 2);
        assert_eq!(out.counts.total, 0);
    }

    #[test]
    fn nested_items_that_are_not_tweets_are_skipped() {
        let raw = batch(vec![json!({
            "tweets": [{"id": "1"}, {"id": "2", "text": "ok"}],
            "places": [{"id": "p1", "full_name": "Phoenix, AZ"}],
            "result_count": 1
        })]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);
        assert_eq!(out.tweets.len(), 1);
        assert_eq!(out.tweets[0]["id"], "2");
    }

    #[test]
    fn every_record_is_stamped() {
        let raw = batch(vec![
            json!({"id": "1", "text": "x", "author_id": "9"}),
            json!({"users": [{"id": "9", "username": "nine"}], "result_count": 1}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);
        assert_eq!(out.tweets[0][FETCHED_TIMESTAMP], AT);
        assert_eq!(out.users[0][FETCHED_TIMESTAMP], AT);
    }

    #[test]
    fn result_counts_sum_across_pages() {
        let raw = batch(vec![
            json!({"id": "1", "text": "x"}),
            json!({"result_count": 10}),
            json!({"id": "2", "text": "y"}),
            json!({"result_count": 7}),
        ]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);
        assert_eq!(out.counts.total, 17);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = batch(vec![
            json!({"id": "1", "text": "x"}),
            json!({"tweets": [{"id": "1", "text": "y"}], "users": [{"id": "3", "username": "c"}], "result_count": 1}),
        ]);
        let first = normalize_at(&raw, NormalizeOptions::default(), AT);
        let second = normalize_at(&raw, NormalizeOptions::default(), AT);
        assert_eq!(first, second);
    }

    #[test]
    fn timestamps_have_microsecond_precision() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(fetched_timestamp(at), AT);
    }

    #[test]
    fn non_object_values_are_ignored() {
        let raw = batch(vec![json!("noise"), json!(3), json!({"id": "1", "text": "x"})]);
        let out = normalize_at(&raw, NormalizeOptions::default(), AT);
        assert_eq!(out.tweets.len(), 1);
    }
}
