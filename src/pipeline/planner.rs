// src/pipeline/planner.rs

//! Adaptive budget planning.
//!
//! Spreads the calls left in the monthly window evenly over the cycles left
//! in it, then sizes individual network calls within the API's 10..=100
//! bounds.
//!
//! ## Floor
//!
//! A cap below [`MIN_RESULTS`] is raised to it so a nearly spent budget never
//! stalls a query. Summed over a window this can overspend the budget by up
//! to `MIN_RESULTS` per remaining cycle: the monthly budget is a soft
//! ceiling, not a hard one.

use serde::Serialize;

/// Smallest page the search API accepts.
pub const MIN_RESULTS: u32 = 10;

/// Largest page the search API accepts.
pub const MAX_RESULTS_PER_CALL: u32 = 100;

/// Inputs to one planning decision.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    /// Calls left in the window (may be negative after an overrun)
    pub remaining_calls: i64,
    /// Seconds until the window closes
    pub remaining_window_secs: i64,
    /// Idle time between cycles
    pub cycle_period_secs: u64,
    /// Fixed per-cycle cap configured on the query
    pub quota_override: Option<u32>,
}

/// Sizing for the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetPlan {
    /// Cycles estimated to remain in the window (at least 1)
    pub remaining_iterations: i64,
    /// Results the cycle may request in total
    pub per_cycle_cap: u32,
    /// Results requested per network call
    pub results_per_call: u32,
    /// Whether the cap came from the query's override
    pub overridden: bool,
}

/// Outcome of planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// Fetch with this sizing
    Fetch(BudgetPlan),
    /// No calls left in the window; skip the fetch
    Exhausted { remaining_calls: i64 },
}

/// Cycles that fit in the remaining window, never less than 1.
pub fn remaining_iterations(remaining_window_secs: i64, cycle_period_secs: u64) -> i64 {
    let period = cycle_period_secs.max(1) as i64;
    (remaining_window_secs.max(0) / period).max(1)
}

/// Decide how much the next cycle may fetch.
pub fn plan(input: PlanInput) -> PlanDecision {
    if input.remaining_calls <= 0 {
        return PlanDecision::Exhausted {
            remaining_calls: input.remaining_calls,
        };
    }

    let iterations = remaining_iterations(input.remaining_window_secs, input.cycle_period_secs);
    let (cap, overridden) = match input.quota_override {
        Some(cap) => (cap, true),
        None => {
            let share = input.remaining_calls / iterations;
            (u32::try_from(share).unwrap_or(u32::MAX), false)
        }
    };

    let (per_cycle_cap, results_per_call) = size_calls(cap);
    PlanDecision::Fetch(BudgetPlan {
        remaining_iterations: iterations,
        per_cycle_cap,
        results_per_call,
        overridden,
    })
}

/// Apply the floor and split a cap into per-call sizes.
fn size_calls(cap: u32) -> (u32, u32) {
    if cap >= MAX_RESULTS_PER_CALL {
        (cap, MAX_RESULTS_PER_CALL)
    } else {
        let cap = cap.max(MIN_RESULTS);
        (cap, cap)
    }
}
