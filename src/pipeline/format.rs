// src/pipeline/format.rs

//! Reshape normalized records for the sinks.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{Record, field_as_key, record_id};

/// Field carrying the campaign tag on every record handed to a sink.
pub const CAMPAIGN_FIELD: &str = "camp_id";

/// Tag every record with `campaign`.
pub fn add_campaign(records: &mut [Record], campaign: &str) {
    for record in records.iter_mut() {
        record.insert(CAMPAIGN_FIELD.to_string(), Value::from(campaign));
    }
}

/// Flatten each tweet together with its author.
///
/// Tweet fields become `tweet_<key>` and the fields of the user whose `id`
/// matches the tweet's `author_id` become `tweet_author_<key>`. Tweets whose
/// author was not side-loaded are kept with their own fields only.
///
/// The tweet's `author_id` and the author's `id` both land on
/// `tweet_author_id`; they always hold the same value.
pub fn denormalize_tweets(tweets: &[Record], users: &[Record]) -> Vec<Record> {
    let authors: HashMap<String, &Record> = users
        .iter()
        .filter_map(|u| record_id(u).map(|id| (id, u)))
        .collect();

    let mut missing = 0usize;
    let flat: Vec<Record> = tweets
        .iter()
        .map(|tweet| {
            let mut out = prefixed(tweet, "tweet_");
            match field_as_key(tweet, "author_id").and_then(|id| authors.get(&id)) {
                Some(author) => out.extend(prefixed(author, "tweet_author_")),
                None => missing += 1,
            }
            out
        })
        .collect();

    if missing > 0 {
        log::warn!(
            "{} of {} tweets had no matching author in the batch",
            missing,
            tweets.len()
        );
    }
    flat
}

fn prefixed(record: &Record, prefix: &str) -> Record {
    record
        .iter()
        .map(|(k, v)| (format!("{prefix}{k}"), v.clone()))
        .collect()
}

/// Largest numeric tweet id, rendered in decimal.
///
/// Ids that do not parse as integers are ignored.
pub fn max_tweet_id(tweets: &[Record]) -> Option<String> {
    tweets
        .iter()
        .filter_map(record_id)
        .filter_map(|id| id.parse::<u128>().ok())
        .max()
        .map(|id| id.to_string())
}
