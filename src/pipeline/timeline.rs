// src/pipeline/timeline.rs

//! User timeline capture.
//!
//! Timelines are billed against the same monthly quota as search, so every
//! user whose fetch produced tweets is charged before delivery.

use std::path::Path;

use chrono::Local;

use crate::error::Result;
use crate::pipeline::cycle::deliver;
use crate::pipeline::normalize::{NormalizeOptions, normalize};
use crate::services::UserApi;
use crate::state::QuotaStore;
use crate::storage::RecordSink;

/// Default number of timeline tweets per user.
pub const DEFAULT_TIMELINE_MAX: u32 = 3200;

/// Per-user result of a timeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineReport {
    pub username: String,
    pub found: bool,
    pub tweets: usize,
    pub users: usize,
    pub charged: u64,
}

/// Collaborators and settings for a timeline run.
pub struct TimelineJob<'a> {
    pub api: &'a dyn UserApi,
    pub quota: &'a QuotaStore,
    pub sinks: &'a [Box<dyn RecordSink>],
    pub campaign: &'a str,
    pub options: NormalizeOptions,
    pub max_results: u32,
}

/// Read one username per line, skipping blanks.
pub async fn read_usernames(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

impl TimelineJob<'_> {
    /// Capture the timeline of each user in turn.
    pub async fn run(&self, usernames: &[String]) -> Result<Vec<TimelineReport>> {
        let mut reports = Vec::with_capacity(usernames.len());
        for username in usernames {
            reports.push(self.capture(username).await?);
        }
        Ok(reports)
    }

    async fn capture(&self, username: &str) -> Result<TimelineReport> {
        let mut report = TimelineReport {
            username: username.to_string(),
            found: false,
            tweets: 0,
            users: 0,
            charged: 0,
        };

        let Some(user_id) = self.api.user_id_by_username(username).await? else {
            log::warn!("No account found for {}, skipping", username);
            return Ok(report);
        };
        report.found = true;

        let now = Local::now().naive_local();
        let quota = self.quota.load(now).await?;
        log::info!(
            "Fetching timeline of {}: quota used {}, {} of {} calls remaining",
            username,
            quota.used,
            quota.remaining_calls(),
            quota.budget_max
        );

        let raw = self.api.get_user_timeline(&user_id, self.max_results).await?;
        let batch = normalize(&raw, self.options);
        report.tweets = batch.tweets.len();
        report.users = batch.users.len();

        if !batch.tweets.is_empty() {
            let after = self.quota.record_usage(batch.counts.total, now).await?;
            report.charged = batch.counts.total;
            log::info!(
                "Fetched {} for {}, quota used now {}, {} calls remaining",
                batch.counts.total,
                username,
                after.used,
                after.remaining_calls()
            );
        }

        deliver(self.sinks, self.campaign, &batch).await?;
        Ok(report)
    }
}
