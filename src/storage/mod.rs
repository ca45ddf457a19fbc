//! Sinks that receive normalized records.
//!
//! Every sink is an idempotent upsert keyed by the record identifier, so a
//! cycle replayed after a crash rewrites the same documents and nodes
//! instead of duplicating them.
//!
//! ## Document layout
//!
//! ```text
//! {document_dir}/
//! ├── tweets/              # Denormalized tweets, keyed by tweet_id
//! │   └── 1460323737035677698.json
//! └── twitter_users/       # User profiles, keyed by id
//!     └── 2244994945.json
//! ```

#[cfg(feature = "graph")]
pub mod graph;
pub mod local;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Record;

#[cfg(feature = "graph")]
pub use graph::GraphSink;
pub use local::DocumentStore;

/// Collection a batch of records belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Denormalized tweets (`tweet_*` / `tweet_author_*` fields)
    Tweets,
    /// User profiles
    Users,
}

impl RecordKind {
    /// Field holding the upsert key.
    pub fn id_field(self) -> &'static str {
        match self {
            RecordKind::Tweets => "tweet_id",
            RecordKind::Users => "id",
        }
    }

    /// Document bucket the kind is stored under.
    pub fn bucket(self) -> &'static str {
        match self {
            RecordKind::Tweets => "tweets",
            RecordKind::Users => "twitter_users",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Tweets => f.write_str("tweets"),
            RecordKind::Users => f.write_str("users"),
        }
    }
}

/// A persistence target for normalized records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Upsert `records`, returning how many were written.
    ///
    /// Batching is the sink's own concern.
    async fn insert(&self, kind: RecordKind, records: &[Record]) -> Result<usize>;
}

/// Insert into every sink in order, stopping at the first failure.
pub async fn insert_all(
    sinks: &[Box<dyn RecordSink>],
    kind: RecordKind,
    records: &[Record],
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    for sink in sinks {
        let written = sink.insert(kind, records).await?;
        log::info!("{}: upserted {} {}", sink.name(), written, kind);
    }
    Ok(())
}
