// src/state/mod.rs

//! Durable crawl state shared across cycles.
//!
//! ## Layout
//!
//! ```text
//! {storage}/
//! ├── config.toml     # Crawler configuration
//! ├── quota.json      # Monthly call budget (QuotaStore)
//! ├── queries.json    # Crawl targets and cursors (QueryStore)
//! └── crawler.lock    # Present while a cycle runs (CycleLock)
//! ```
//!
//! Both JSON files are read, mutated in memory and written back whole on
//! every update. That is fine for tens to hundreds of queries; larger sets
//! want per-record transactional storage behind the same methods.

mod lock;
mod queries;
mod quota;

pub use lock::CycleLock;
pub use queries::QueryStore;
pub use quota::QuotaStore;
