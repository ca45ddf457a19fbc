//! Crawl targets and the set that holds them.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A keyword search the crawler keeps polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    /// Search expression sent upstream
    #[serde(alias = "query")]
    pub text: String,

    /// Inactive queries are never selected
    #[serde(default = "default_active")]
    pub active: bool,

    /// Newest tweet id seen by the last successful fetch
    #[serde(default, alias = "since_id")]
    pub cursor: Option<String>,

    /// Fixed per-cycle result cap, bypassing the adaptive planner
    #[serde(default)]
    pub quota_override: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl Query {
    /// Create a fresh, active query with no cursor.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            active: true,
            cursor: None,
            quota_override: None,
        }
    }
}

/// Ordered collection of queries, persisted as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct QuerySet {
    queries: Vec<Query>,
}

impl QuerySet {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.queries.iter().filter(|q| q.active).count()
    }

    /// Check that every query carries a non-empty search expression.
    pub fn validate(&self) -> Result<()> {
        if let Some(pos) = self.queries.iter().position(|q| q.text.trim().is_empty()) {
            return Err(AppError::validation(format!(
                "query #{} has an empty search expression",
                pos
            )));
        }
        Ok(())
    }

    /// Pick an active query uniformly at random.
    pub fn select_active<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Query> {
        let active: Vec<&Query> = self.queries.iter().filter(|q| q.active).collect();
        active
            .choose(rng)
            .copied()
            .ok_or(AppError::EmptyQuerySet)
    }

    /// Overwrite the cursor of the query with exactly this text.
    pub fn advance_cursor(&mut self, text: &str, cursor: impl Into<String>) -> Result<()> {
        let query = self
            .queries
            .iter_mut()
            .find(|q| q.text == text)
            .ok_or_else(|| AppError::QueryNotFound(text.to_string()))?;
        query.cursor = Some(cursor.into());
        Ok(())
    }

    /// Drop every query with exactly this text. Returns whether one was removed.
    pub fn remove(&mut self, text: &str) -> bool {
        let before = self.queries.len();
        self.queries.retain(|q| q.text != text);
        self.queries.len() != before
    }

    /// Append a query at the end of the set.
    pub fn push(&mut self, query: Query) {
        self.queries.push(query);
    }
}
