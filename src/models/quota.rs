//! Monthly call budget state.

use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Calls consumed within the current monthly window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaState {
    /// Date the current window began
    #[serde(alias = "quota_start_date")]
    pub window_start: NaiveDate,

    /// Calls allowed per window
    #[serde(alias = "quota_max")]
    pub budget_max: i64,

    /// Calls consumed so far in the window
    #[serde(alias = "quota_used")]
    pub used: i64,
}

impl QuotaState {
    /// A fresh window starting on `today`.
    pub fn new(today: NaiveDate, budget_max: i64) -> Self {
        Self {
            window_start: today,
            budget_max,
            used: 0,
        }
    }

    /// Midnight one calendar month after the window start.
    pub fn window_end(&self) -> NaiveDateTime {
        let start = self.window_start.and_time(chrono::NaiveTime::MIN);
        start
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Whether `now` lies past the end of the window.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.window_end()
    }

    /// The state after applying window rollover at `now`.
    ///
    /// Returns `None` when the window is still open.
    pub fn rolled_over(&self, now: NaiveDateTime) -> Option<Self> {
        self.is_expired(now)
            .then(|| Self::new(now.date(), self.budget_max))
    }

    /// Calls left in the window. Negative after an overrun.
    pub fn remaining_calls(&self) -> i64 {
        self.budget_max - self.used
    }

    /// Seconds from `now` until the window closes, floored at 0.
    pub fn remaining_window_secs(&self, now: NaiveDateTime) -> i64 {
        (self.window_end() - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn state(start: &str, used: i64) -> QuotaState {
        QuotaState {
            window_start: start.parse().unwrap(),
            budget_max: 3000,
            used,
        }
    }

    #[test]
    fn window_end_is_one_calendar_month_later() {
        assert_eq!(state("2024-01-01", 0).window_end(), at("2024-02-01", "00:00:00"));
        // Clamped to the last day of a shorter month
        assert_eq!(state("2024-01-31", 0).window_end(), at("2024-02-29", "00:00:00"));
    }

    #[test]
    fn rollover_resets_usage_and_moves_start_to_today() {
        let quota = state("2024-01-01", 2990);
        let now = at("2024-02-03", "10:15:00");
        let rolled = quota.rolled_over(now).unwrap();
        assert_eq!(rolled.used, 0);
        assert_eq!(rolled.window_start, now.date());
        assert_eq!(rolled.budget_max, 3000);
    }

    #[test]
    fn no_rollover_inside_window() {
        let quota = state("2024-01-01", 10);
        assert!(quota.rolled_over(at("2024-01-31", "23:59:59")).is_none());
        assert!(quota.rolled_over(at("2024-02-01", "00:00:00")).is_none());
    }

    #[test]
    fn remaining_calls_can_go_negative() {
        assert_eq!(state("2024-01-01", 3050).remaining_calls(), -50);
    }

    #[test]
    fn remaining_window_secs_counts_down() {
        let quota = state("2024-01-01", 0);
        assert_eq!(quota.remaining_window_secs(at("2024-01-31", "23:00:00")), 3600);
        assert_eq!(quota.remaining_window_secs(at("2024-03-01", "00:00:00")), 0);
    }

    #[test]
    fn reads_legacy_field_names() {
        let json = r#"{"quota_start_date": "2021-06-01", "quota_max": 10000000, "quota_used": 42}"#;
        let quota: QuotaState = serde_json::from_str(json).unwrap();
        assert_eq!(quota.window_start, "2021-06-01".parse::<NaiveDate>().unwrap());
        assert_eq!(quota.budget_max, 10_000_000);
        assert_eq!(quota.used, 42);
    }
}
