//! Persistent quota counter with monthly window rollover.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::QuotaState;
use crate::utils::fs;

/// File-backed [`QuotaState`].
///
/// The file is the single source of truth: every operation re-reads it, so
/// a crash between operations loses nothing that was already persisted.
#[derive(Debug, Clone)]
pub struct QuotaStore {
    path: PathBuf,
    default_budget: i64,
}

impl QuotaStore {
    /// `default_budget` seeds the file when it does not exist yet.
    pub fn new(path: impl Into<PathBuf>, default_budget: i64) -> Self {
        Self {
            path: path.into(),
            default_budget,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state with window rollover applied at `now`.
    ///
    /// A rollover is persisted before returning, so it survives a crash
    /// that happens before any usage is recorded.
    pub async fn load(&self, now: NaiveDateTime) -> Result<QuotaState> {
        let state = match fs::read_json::<QuotaState>(&self.path).await? {
            Some(state) => state,
            None => {
                let state = QuotaState::new(now.date(), self.default_budget);
                log::info!(
                    "No quota file at {}, starting a new window on {} with budget {}",
                    self.path.display(),
                    state.window_start,
                    state.budget_max
                );
                fs::write_json(&self.path, &state).await?;
                state
            }
        };

        match state.rolled_over(now) {
            Some(rolled) => {
                log::info!(
                    "Quota window {} ended at {}; resetting usage ({} used) and starting {}",
                    state.window_start,
                    state.window_end(),
                    state.used,
                    rolled.window_start
                );
                fs::write_json(&self.path, &rolled).await?;
                Ok(rolled)
            }
            None => Ok(state),
        }
    }

    /// Add `calls` to the usage counter and persist atomically.
    pub async fn record_usage(&self, calls: u64, now: NaiveDateTime) -> Result<QuotaState> {
        let mut state = self.load(now).await?;
        state.used = state.used.saturating_add(calls as i64);
        fs::write_json(&self.path, &state).await?;
        log::debug!(
            "Recorded {} calls, quota used {}/{}",
            calls,
            state.used,
            state.budget_max
        );
        Ok(state)
    }
}
