// src/pipeline/cycle.rs

//! The crawl cycle driver.
//!
//! One cycle walks `SELECT → PLAN → FETCH → (RETRY_NO_CURSOR) → NORMALIZE →
//! PERSIST → ADVANCE` and the long-running loop idles between cycles.
//! Cycles never overlap: quota accounting and cursor advance rely on it.
//!
//! Durable effects are ordered so a crash never hides consumption:
//! quota usage is persisted right after normalization, before any sink
//! sees the records, and the cursor only advances once every sink has
//! accepted them. A crash in between replays the same tweets next cycle,
//! which the idempotent sinks absorb.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::Result;
use crate::models::{CrawlerConfig, NormalizedBatch, Query, QuotaState};
use crate::pipeline::format::{add_campaign, denormalize_tweets, max_tweet_id};
use crate::pipeline::normalize::{NormalizeOptions, fetched_timestamp, normalize_at};
use crate::pipeline::planner::{self, BudgetPlan, PlanDecision, PlanInput};
use crate::services::{FetchErrorKind, SearchApi, SearchRequest};
use crate::state::{CycleLock, QueryStore, QuotaStore};
use crate::storage::{RecordKind, RecordSink, insert_all};

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Tweets were fetched, charged and delivered
    Fetched {
        query: String,
        tweets: usize,
        users: usize,
        charged: u64,
        cursor: Option<String>,
    },
    /// The fetch produced no tweets; nothing was charged
    NoTweets { query: String, users: usize },
    /// The cursor was rejected and a cursor-less retry found nothing
    DeadQueryRemoved { query: String },
    /// No calls left in the quota window; the fetch was skipped
    BudgetExhausted { query: String, remaining_calls: i64 },
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Fetched {
                query,
                tweets,
                users,
                charged,
                cursor,
            } => write!(
                f,
                "{query:?}: {tweets} tweets, {users} users, {charged} calls charged, cursor {}",
                cursor.as_deref().unwrap_or("unchanged")
            ),
            CycleOutcome::NoTweets { query, users } => {
                write!(f, "{query:?}: no new tweets ({users} users)")
            }
            CycleOutcome::DeadQueryRemoved { query } => {
                write!(f, "{query:?}: no matching content, removed")
            }
            CycleOutcome::BudgetExhausted {
                query,
                remaining_calls,
            } => write!(
                f,
                "{query:?}: skipped, quota exhausted ({remaining_calls} calls remaining)"
            ),
        }
    }
}

/// Tag, reshape and hand a normalized batch to every sink.
///
/// Tweets go out denormalized with their authors; users go out as-is.
pub async fn deliver(
    sinks: &[Box<dyn RecordSink>],
    campaign: &str,
    batch: &NormalizedBatch,
) -> Result<()> {
    let mut users = batch.users.clone();
    add_campaign(&mut users, campaign);

    if !batch.tweets.is_empty() {
        let mut tweets = denormalize_tweets(&batch.tweets, &users);
        add_campaign(&mut tweets, campaign);
        insert_all(sinks, RecordKind::Tweets, &tweets).await?;
    }
    insert_all(sinks, RecordKind::Users, &users).await
}

/// Drives crawl cycles against injected collaborators.
pub struct CrawlDriver {
    settings: CrawlerConfig,
    api: Arc<dyn SearchApi>,
    quota: QuotaStore,
    queries: QueryStore,
    lock: CycleLock,
    sinks: Vec<Box<dyn RecordSink>>,
    rng: StdRng,
}

impl CrawlDriver {
    pub fn new(
        settings: CrawlerConfig,
        api: Arc<dyn SearchApi>,
        quota: QuotaStore,
        queries: QueryStore,
        lock: CycleLock,
    ) -> Self {
        Self {
            settings,
            api,
            quota,
            queries,
            lock,
            sinks: Vec::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Add a sink; records are delivered to sinks in the order added.
    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Replace the query-selection RNG.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Run cycles until a fatal error or ctrl-c.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Cannot listen for ctrl-c: {}", e);
            }
        })
        .await
    }

    /// Run cycles until a fatal error or until `shutdown` resolves.
    ///
    /// Shutdown is only observed while idling; a cycle in flight always
    /// finishes first.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = self.settings.cycle_period();
        log::info!(
            "Starting crawl loop: campaign {:?}, cycle every {}s, sinks {:?}",
            self.settings.campaign,
            period.as_secs(),
            self.sink_names()
        );
        tokio::pin!(shutdown);

        loop {
            match self.run_cycle().await {
                Ok(outcome) => log::info!("Cycle finished: {}", outcome),
                Err(e) if e.is_fatal() => {
                    log::error!("Stopping crawl loop: {}", e);
                    return Err(e);
                }
                Err(e) => log::warn!("Cycle aborted ({}), retrying after idle", e),
            }

            log::info!("Idling {}s until the next cycle", period.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, leaving crawl loop");
                    return Ok(());
                }
            }
        }
    }

    /// Run one cycle at the current local time.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.run_cycle_at(Local::now().naive_local()).await
    }

    /// Run one cycle as if the wall clock read `now`.
    ///
    /// The lock marker is removed on every successful outcome and left in
    /// place when the cycle errors.
    pub async fn run_cycle_at(&mut self, now: NaiveDateTime) -> Result<CycleOutcome> {
        if let Err(e) = self.lock.acquire().await {
            self.log_failure(None, now, &e).await;
            return Err(e);
        }

        let query = match self.select().await {
            Ok(query) => query,
            Err(e) => {
                self.log_failure(None, now, &e).await;
                return Err(e);
            }
        };
        match self.crawl(&query, now).await {
            Ok(outcome) => {
                self.lock.release().await?;
                Ok(outcome)
            }
            Err(e) => {
                self.log_failure(Some(&query), now, &e).await;
                Err(e)
            }
        }
    }

    /// SELECT
    async fn select(&mut self) -> Result<Query> {
        let set = self.queries.load().await?;
        let query = set.select_active(&mut self.rng)?.clone();
        log::info!(
            "Selected query {:?} ({} active of {})",
            query.text,
            set.active_count(),
            set.len()
        );
        Ok(query)
    }

    async fn crawl(&self, query: &Query, now: NaiveDateTime) -> Result<CycleOutcome> {
        // PLAN
        let quota = self.quota.load(now).await?;
        let decision = planner::plan(PlanInput {
            remaining_calls: quota.remaining_calls(),
            remaining_window_secs: quota.remaining_window_secs(now),
            cycle_period_secs: self.settings.cycle_period_secs(),
            quota_override: query.quota_override,
        });
        let plan = match decision {
            PlanDecision::Fetch(plan) => {
                log_snapshot(&quota, now, Some(&plan));
                plan
            }
            PlanDecision::Exhausted { remaining_calls } => {
                log_snapshot(&quota, now, None);
                log::warn!(
                    "Quota exhausted until {}, skipping fetch for {:?}",
                    quota.window_end(),
                    query.text
                );
                return Ok(CycleOutcome::BudgetExhausted {
                    query: query.text.clone(),
                    remaining_calls,
                });
            }
        };

        // FETCH
        let request = SearchRequest {
            query: query.text.clone(),
            max_results: plan.per_cycle_cap,
            results_per_call: plan.results_per_call,
            since_id: query.cursor.clone(),
        };
        let options = NormalizeOptions {
            dedupe: self.settings.dedupe,
        };
        let stamp = fetched_timestamp(now);

        let batch = match self.api.search(&request).await {
            Ok(raw) => normalize_at(&raw, options, &stamp),
            Err(e) if e.kind() == FetchErrorKind::CursorInvalid && request.since_id.is_some() => {
                // RETRY_NO_CURSOR
                log::warn!(
                    "Cursor {:?} rejected for {:?} ({}), retrying without it",
                    request.since_id,
                    query.text,
                    e
                );
                let raw = self.api.search(&request.without_cursor()).await?;
                let batch = normalize_at(&raw, options, &stamp);
                if batch.counts.total == 0 && batch.tweets.is_empty() {
                    let removed = self.queries.remove(&query.text).await?;
                    log::info!(
                        "Query {:?} has no matching content, {}",
                        query.text,
                        if removed { "removed" } else { "already gone" }
                    );
                    return Ok(CycleOutcome::DeadQueryRemoved {
                        query: query.text.clone(),
                    });
                }
                batch
            }
            Err(e) => return Err(e.into()),
        };

        // PERSIST
        if batch.tweets.is_empty() {
            deliver(&self.sinks, &self.settings.campaign, &batch).await?;
            return Ok(CycleOutcome::NoTweets {
                query: query.text.clone(),
                users: batch.users.len(),
            });
        }

        let charged = batch.counts.total;
        let after = self.quota.record_usage(charged, now).await?;
        log::info!(
            "Charged {} calls, quota used {}/{}",
            charged,
            after.used,
            after.budget_max
        );
        deliver(&self.sinks, &self.settings.campaign, &batch).await?;

        // ADVANCE
        let cursor = max_tweet_id(&batch.tweets);
        match &cursor {
            Some(id) => self.queries.advance_cursor(&query.text, id).await?,
            None => log::warn!("No numeric tweet id in batch, cursor for {:?} unchanged", query.text),
        }

        Ok(CycleOutcome::Fetched {
            query: query.text.clone(),
            tweets: batch.tweets.len(),
            users: batch.users.len(),
            charged,
            cursor,
        })
    }

    /// Log a failed cycle with the query it was working on and a quota snapshot.
    async fn log_failure(
        &self,
        query: Option<&Query>,
        now: NaiveDateTime,
        error: &crate::error::AppError,
    ) {
        match query {
            Some(query) => log::error!(
                "Cycle for query {:?} (cursor {:?}) failed: {}",
                query.text,
                query.cursor,
                error
            ),
            None => log::error!("Cycle failed before a query was selected: {}", error),
        }
        match self.quota.load(now).await {
            Ok(quota) => log::error!(
                "Quota at failure: used {}/{}, window {} to {}",
                quota.used,
                quota.budget_max,
                quota.window_start,
                quota.window_end()
            ),
            Err(e) => log::error!("Quota unavailable at failure: {}", e),
        }
    }
}

fn log_snapshot(quota: &QuotaState, now: NaiveDateTime, plan: Option<&BudgetPlan>) {
    log::info!(
        "Quota used {}/{} ({} remaining), window {} to {} ({}s left)",
        quota.used,
        quota.budget_max,
        quota.remaining_calls(),
        quota.window_start,
        quota.window_end(),
        quota.remaining_window_secs(now)
    );
    if let Some(plan) = plan {
        log::info!(
            "Plan: {} iterations left, cap {}{}, {} per call",
            plan.remaining_iterations,
            plan.per_cycle_cap,
            if plan.overridden { " (override)" } else { "" },
            plan.results_per_call
        );
    }
}
