//! Core crawl algorithms and the flows built on them.
//!
//! - `normalize`: Flatten raw API batches into tweets and users
//! - `planner`: Size each cycle against the monthly quota
//! - `format`: Reshape normalized records for the sinks
//! - `cycle`: The crawl cycle driver and its long-running loop
//! - `queries`: Fold candidate terms into the query set
//! - `followers` / `timeline`: One-shot capture tools

pub mod cycle;
pub mod followers;
pub mod format;
pub mod normalize;
pub mod planner;
pub mod queries;
pub mod timeline;

pub use cycle::{CrawlDriver, CycleOutcome, deliver};
pub use followers::{Direction, NetworkOptions, NetworkOutcome, capture_network};
pub use normalize::{NormalizeOptions, normalize, normalize_at};
pub use planner::{BudgetPlan, PlanDecision, PlanInput, plan};
pub use queries::{AddQueriesOptions, AddQueriesReport, add_queries};
pub use timeline::{TimelineJob, TimelineReport, read_usernames};
