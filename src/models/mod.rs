// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod query;
mod quota;
mod record;

// Re-export all public types
pub use config::{
    ApiConfig, Config, CrawlerConfig, DocumentSinkConfig, GraphSinkConfig, PathsConfig,
    QuotaConfig, SinksConfig,
};
pub use query::{Query, QuerySet};
pub use quota::QuotaState;
pub use record::{Counts, NormalizedBatch, RawBatch, Record, field_as_key, record_id};
